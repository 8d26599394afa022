use crate::models::RawProperty;
use crate::scrapers::traits::ListingScraper;
use crate::scrapers::USER_AGENT;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SITE_ROOT: &str = "https://www.idealista.pt";

/// Idealista search-results scraper
pub struct IdealistaScraper {
    client: Client,
}

impl IdealistaScraper {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ListingScraper for IdealistaScraper {
    async fn scrape(&self, url: &str) -> Result<Vec<RawProperty>> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch search results page")?;

        if !response.status().is_success() {
            warn!("idealista returned status: {}", response.status());
            anyhow::bail!("Failed to fetch search results page: {}", response.status());
        }

        let html = response.text().await.context("Failed to read response body")?;
        debug!("Downloaded {} bytes of HTML", html.len());

        let properties = extract_properties(&html);
        if properties.is_empty() {
            warn!("No property cards found on {}", url);
        } else {
            info!("Extracted {} property cards", properties.len());
        }

        Ok(properties)
    }

    fn source_name(&self) -> &'static str {
        "Idealista"
    }
}

/// Pulls one `RawProperty` per result card. Cards without a resolvable
/// listing link or numeric id are skipped.
pub fn extract_properties(html: &str) -> Vec<RawProperty> {
    let document = Html::parse_document(html);
    let card_selector = Selector::parse("article.item").unwrap();
    let link_selector = Selector::parse(r#"a.item-link[href^="/imovel/"]"#).unwrap();
    let price_selector = Selector::parse(".price-row .item-price").unwrap();
    let detail_selector = Selector::parse(".item-detail-char .item-detail").unwrap();
    let parking_selector = Selector::parse(".item-parking").unwrap();
    let garage_title_selector = Selector::parse(r#"[title*="garagem"]"#).unwrap();

    let mut properties = Vec::new();

    for card in document.select(&card_selector) {
        let link = match card.select(&link_selector).next() {
            Some(link) => link,
            None => continue,
        };
        let href = link.value().attr("href").unwrap_or("");
        let id = match extract_id(href) {
            Some(id) => id,
            None => continue,
        };

        let price_text = card
            .select(&price_selector)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let details: Vec<String> = card.select(&detail_selector).map(text_of).collect();
        let typology_text = details.first().cloned().unwrap_or_default();
        let area_text = details
            .iter()
            .find(|text| text.contains("m²"))
            .cloned()
            .unwrap_or_default();

        let has_garage = card.select(&parking_selector).next().is_some()
            || card.select(&garage_title_selector).next().is_some();

        properties.push(RawProperty {
            id,
            url: format!("{SITE_ROOT}{href}"),
            price: parse_price(&price_text),
            typology: parse_typology(&typology_text),
            area: format!("{} m²", parse_area(&area_text)),
            has_garage,
        });
    }

    properties
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn extract_id(href: &str) -> Option<String> {
    let tail = href.split("/imovel/").nth(1)?;
    let id: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn parse_price(text: &str) -> i64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn parse_area(text: &str) -> i64 {
    let before = match text.find("m²") {
        Some(i) => text[..i].trim_end(),
        None => return 0,
    };
    let digits: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

/// Typology token: "T<n>", "Quarto" or "Estúdio"; anything else passes
/// through as the raw card text.
fn parse_typology(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if (c == 'T' || c == 't') && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
            let digits: String = chars[i + 1..]
                .iter()
                .take_while(|d| d.is_ascii_digit())
                .collect();
            return format!("{c}{digits}");
        }
    }
    let lower = text.to_lowercase();
    if lower.contains("quarto") {
        return "Quarto".to_string();
    }
    if lower.contains("estúdio") {
        return "Estúdio".to_string();
    }
    text.trim().to_string()
}
