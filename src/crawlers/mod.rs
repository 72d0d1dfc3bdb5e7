pub mod backtrack;
pub mod headless;

#[cfg(test)]
mod tests;

pub use headless::{Crawler, CrawlerOptions};
