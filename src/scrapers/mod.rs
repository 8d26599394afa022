pub mod idealista;
pub mod traits;

pub use idealista::IdealistaScraper;
pub use traits::ListingScraper;

/// Browser-like user agent shared by the page scraper and the status probe.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
