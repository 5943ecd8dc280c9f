/**
 * ============================================================================
 * ENVIRONMENT CONTEXT MODULE
 * ============================================================================
 *
 * PURPOSE: Ambient host metadata behind an injectable interface
 *
 * The tracker never reaches for global state: page URL, user agent,
 * document title, referrer, scroll position and the clock all come from an
 * EnvironmentContext handed to it at construction.
 *
 * ============================================================================
 */

use chrono::Utc;
use std::sync::{PoisonError, RwLock};

/**
 * Accessors for the host the tracker is embedded in
 */
pub trait EnvironmentContext: Send + Sync {
    fn current_url(&self) -> String;

    fn user_agent(&self) -> String;

    fn document_title(&self) -> String;

    fn referrer(&self) -> String;

    /// Percentage of the document scrolled into view (0-100)
    fn scroll_depth(&self) -> u32;

    /// Epoch milliseconds
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone)]
struct PageState {
    url: String,
    title: String,
    referrer: String,
    scroll_y: f64,
    viewport_height: f64,
    scroll_height: f64,
}

/**
 * In-memory environment updated by the host
 * Suitable for native hosts and for tests
 */
#[derive(Debug)]
pub struct StaticEnvironment {
    user_agent: String,
    page: RwLock<PageState>,
}

impl StaticEnvironment {
    pub fn new(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            page: RwLock::new(PageState {
                url: url.into(),
                title: String::new(),
                referrer: String::new(),
                scroll_y: 0.0,
                viewport_height: 0.0,
                scroll_height: 0.0,
            }),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.page.write().unwrap_or_else(PoisonError::into_inner).title = title.into();
        self
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.page.write().unwrap_or_else(PoisonError::into_inner).referrer = referrer.into();
        self
    }

    /**
     * Move to a new page; the previous URL becomes the referrer
     */
    pub fn navigate(&self, url: impl Into<String>, title: impl Into<String>) {
        let mut page = self.page.write().unwrap_or_else(PoisonError::into_inner);
        page.referrer = std::mem::replace(&mut page.url, url.into());
        page.title = title.into();
        page.scroll_y = 0.0;
    }

    pub fn set_scroll(&self, scroll_y: f64, viewport_height: f64, scroll_height: f64) {
        let mut page = self.page.write().unwrap_or_else(PoisonError::into_inner);
        page.scroll_y = scroll_y;
        page.viewport_height = viewport_height;
        page.scroll_height = scroll_height;
    }
}

impl EnvironmentContext for StaticEnvironment {
    fn current_url(&self) -> String {
        self.page.read().unwrap_or_else(PoisonError::into_inner).url.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn document_title(&self) -> String {
        self.page.read().unwrap_or_else(PoisonError::into_inner).title.clone()
    }

    fn referrer(&self) -> String {
        self.page.read().unwrap_or_else(PoisonError::into_inner).referrer.clone()
    }

    fn scroll_depth(&self) -> u32 {
        let page = self.page.read().unwrap_or_else(PoisonError::into_inner);
        if page.scroll_height <= 0.0 {
            return 100;
        }
        let depth = (page.scroll_y + page.viewport_height) / page.scroll_height * 100.0;
        depth.round().clamp(0.0, 100.0) as u32
    }
}
