use crate::config::BrowserConfig;
use crate::Result;
use eoka::{Browser, Page};
use tracing::debug;

const DEFAULT_WIDTH: u32 = 1400;
const DEFAULT_HEIGHT: u32 = 900;

/// The browser process and the single page a run drives.
pub struct Session {
    browser: Browser,
    page: Page,
}

impl Session {
    /// Launch the browser and open a blank page.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config
                .viewport
                .as_ref()
                .map(|v| v.width)
                .unwrap_or(DEFAULT_WIDTH),
            viewport_height: config
                .viewport
                .as_ref()
                .map(|v| v.height)
                .unwrap_or(DEFAULT_HEIGHT),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self { browser, page })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        debug!("Closing browser");
        self.browser.close().await?;
        Ok(())
    }
}
