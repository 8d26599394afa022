//! Display-only derivations: context labels, trend arrows, the terminal
//! table and the CSV export. Nothing here mutates tracked state.

use crate::context::{SearchContext, TransactionType};
use crate::engine::PassSummary;
use crate::models::PropertyRecord;
use chrono::{DateTime, SecondsFormat, Utc};

const EXPORT_HEADERS: [&str; 12] = [
    "ID",
    "Tipologia",
    "Preço Inicial",
    "Preço Atual",
    "Primeira Detecção",
    "Última Atualização",
    "Status",
    "Área",
    "Garagem",
    "Localidade",
    "Sub-localidade",
    "URL",
];

/// Human label for a search context, in the site's own language.
pub fn context_label(ctx: &SearchContext) -> String {
    let transaction = match ctx.transaction_type {
        TransactionType::Rent => "Arrendar",
        TransactionType::Sale => "Comprar",
        TransactionType::Unknown => "?",
    };
    let property = match ctx.property_type.as_str() {
        "houses" => "Casas",
        "apartments" => "Apartamentos",
        "rooms" => "Quartos",
        "offices" => "Escritórios",
        "parking" => "Garagens",
        "lands" => "Terrenos",
        other => other,
    };
    let place = if ctx.location.is_empty() {
        String::new()
    } else {
        let mut place = format!(" em {}", ctx.location.replace('-', " "));
        if !ctx.sub_location.is_empty() {
            place.push_str(&format!(" > {}", ctx.sub_location.replace('-', " ")));
        }
        place
    };
    let sorting = match ctx.sort_order.as_str() {
        "precos-desc" => "↓ Preço",
        "precos-asc" => "↑ Preço",
        "atualizado-desc" => "↓ Atualizado",
        "area-desc" => "↓ Área",
        "default" => "Padrão",
        other => other,
    };
    format!("{transaction} {property}{place} | {sorting}")
}

/// Whole euros with thousands grouping, e.g. `250 000 €`.
pub fn format_price(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    format!("{}{} €", if value < 0 { "-" } else { "" }, grouped)
}

pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Trend arrow from the last recorded price change.
pub fn price_trend(record: &PropertyRecord) -> String {
    let last = match record.history.last() {
        Some(last) => last,
        None => return "→ Estável".to_string(),
    };
    let pct = if last.old_price != 0 {
        ((last.change.abs() as f64 / last.old_price as f64) * 100.0).round() as i64
    } else {
        0
    };
    if last.change > 0 {
        format!("↑ +{} (+{}%)", format_price(last.change), pct)
    } else if last.change < 0 {
        format!("↓ -{} (-{}%)", format_price(-last.change), pct)
    } else {
        "→ Igual".to_string()
    }
}

/// Terminal rendering of one reconciliation pass.
pub fn render_summary(summary: &PassSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("📊 {}\n", context_label(&summary.context)));

    for (i, record) in summary.display.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} | {} | {} | {}\n",
            i + 1,
            record.typology,
            format_price(record.price),
            price_trend(record),
            record.area,
        ));
        out.push_str(&format!(
            "   1ª: {} | Últ: {} | {}\n",
            format_date(record.first_seen),
            format_date(record.last_seen),
            record.url,
        ));
    }

    out.push_str(&format!(
        "{} ativos | {} totais | {} novos\n",
        summary.current_count,
        summary.display.len(),
        summary.new_count,
    ));
    out
}

/// Semicolon-delimited export, every field quoted, embedded quotes doubled.
pub fn to_csv(records: &[PropertyRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(csv_line(
        &EXPORT_HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
    ));

    for record in records {
        lines.push(csv_line(&[
            record.id.clone(),
            record.typology.clone(),
            record.initial_price.to_string(),
            record.price.to_string(),
            record.first_seen.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true),
            if record.is_active == Some(true) { "Ativo" } else { "Inativo" }.to_string(),
            record.area.clone(),
            if record.has_garage { "Sim" } else { "Não" }.to_string(),
            record.location.clone(),
            record.sub_location.clone(),
            record.url.clone(),
        ]));
    }

    lines.join("\n")
}

fn csv_line(fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(";")
}
