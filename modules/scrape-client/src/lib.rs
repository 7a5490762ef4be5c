pub mod browserless;
pub mod error;
pub mod page;
pub mod redirect;
pub mod serper;

pub use browserless::{BrowserlessClient, PageCapture};
pub use error::{Result, ScrapeError};
pub use page::{parse_page, ParsedPage};
pub use redirect::RedirectResolver;
pub use serper::{SerperClient, SerperHit, SerperPage};
