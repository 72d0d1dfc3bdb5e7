use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use crate::browser::BrowserPage;
use crate::errors::CrawlError;

/// Creates fresh browser pages for the pool on demand.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn BrowserPage>, CrawlError>;
}

/// Bounded pool of browser pages.
///
/// Pages are created lazily: acquiring blocks while all slots are in
/// flight, and only connects a new session when no idle page is
/// available. A page whose session died is closed on release instead of
/// being recycled.
pub struct SessionPool {
    factory: Box<dyn PageFactory>,
    idle: Mutex<Vec<Box<dyn BrowserPage>>>,
    slots: Arc<Semaphore>,
}

impl SessionPool {
    pub fn new(factory: Box<dyn PageFactory>, max_sessions: usize) -> Self {
        Self {
            factory,
            idle: Mutex::new(Vec::new()),
            slots: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    /// Takes a ready page out of the pool, creating one if necessary.
    /// May block waiting for a free slot.
    pub async fn acquire(&self) -> Result<Box<dyn BrowserPage>, CrawlError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| CrawlError::Connect("session pool closed".to_string()))?;
        // The permit is restored by release() or by a failed create.
        permit.forget();

        if let Some(page) = self.idle.lock().await.pop() {
            return Ok(page);
        }
        match self.factory.create().await {
            Ok(page) => Ok(page),
            Err(err) => {
                self.slots.add_permits(1);
                Err(err)
            }
        }
    }

    /// Returns a page to the pool, discarding it if its session died.
    pub async fn release(&self, mut page: Box<dyn BrowserPage>) {
        if page.is_connected() {
            self.idle.lock().await.push(page);
        } else {
            ::log::debug!("Discarding disconnected browser page instead of recycling");
            page.close().await;
        }
        self.slots.add_permits(1);
    }

    /// Closes every idle page. In-flight pages are closed on release.
    pub async fn close(&self) {
        let mut idle = self.idle.lock().await;
        for page in idle.iter_mut() {
            page.close().await;
        }
        idle.clear();
    }
}
