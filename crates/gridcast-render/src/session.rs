//! Shared infrastructure for a render run: one static server and one
//! browser, acquired before the first task and released after the last.

use std::path::Path;
use std::sync::Arc;

use gridcast_browser::BrowserHandle;
use gridcast_types::{GridcastConfig, GridcastError};

use crate::job::RenderSettings;
use crate::scheduler::{run_tasks, RenderSummary};
use crate::server::StaticServer;
use crate::task::RenderTask;
use crate::templates::verify_templates;

pub struct RenderSession {
    server: StaticServer,
    browser: BrowserHandle,
    settings: Arc<RenderSettings>,
}

impl RenderSession {
    /// Check templates, start serving `root`, and acquire the browser.
    pub async fn start(root: &Path, config: &GridcastConfig) -> Result<Self, GridcastError> {
        verify_templates(root)?;
        let server = StaticServer::start(root).await?;
        let browser = match BrowserHandle::acquire(&config.browser).await {
            Ok(browser) => browser,
            Err(e) => {
                server.stop().await;
                return Err(e.into());
            }
        };
        let settings = Arc::new(RenderSettings::from_config(&config.render, server.base_url()));
        Ok(Self {
            server,
            browser,
            settings,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Run `tasks` with the given concurrency ceiling.
    pub async fn run(&self, tasks: Vec<RenderTask>, concurrency: usize) -> RenderSummary {
        run_tasks(&self.browser, Arc::clone(&self.settings), tasks, concurrency).await
    }

    /// Close the browser and stop the server.
    pub async fn finish(self) {
        self.browser.shutdown().await;
        self.server.stop().await;
    }
}
