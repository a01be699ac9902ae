//! Plugin lifecycle runner.
//!
//! # Responsibilities
//! - Initialize every initialize-once plugin before the app takes traffic
//! - Bind each produced value onto the application under the plugin's name
//! - Publish the lifecycle state (`Idle → Loading → Ready`)
//!
//! # Design Decisions
//! - Strictly sequential, in attachment order
//! - Any failure is fatal: the app moves to `Failed` and never serves
//! - A plugin that never completes is cut off by `init_timeout` instead of
//!   stalling startup forever
//! - A completion callback dropped without firing fails immediately

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;

use crate::app::App;
use crate::config::PluginConfig;
use crate::dispatch::{panic_message, BoxError};
use crate::plugin::module::{Completion, InitContext};

/// Lifecycle states of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Fatal startup failures raised while initializing plugins.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("plugin `{plugin}` failed to initialize: {source}")]
    PluginInitFault {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("plugin `{plugin}` did not complete within {timeout:?}")]
    InitTimeout { plugin: String, timeout: Duration },

    #[error("plugin `{plugin}` dropped its completion callback without completing")]
    InitAbandoned { plugin: String },

    #[error("application `{app}` already failed to start")]
    AlreadyFailed { app: String },
}

/// Runs the initialize-once phase of an application.
#[derive(Debug, Clone)]
pub struct LifecycleRunner {
    init_timeout: Duration,
}

impl LifecycleRunner {
    pub fn new(init_timeout: Duration) -> Self {
        Self { init_timeout }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(Duration::from_secs(config.init_timeout_secs))
    }

    pub fn init_timeout(&self) -> Duration {
        self.init_timeout
    }

    /// Drive `app` to `Ready`. Calling this on a ready app is a no-op.
    pub async fn run(&self, app: &mut App) -> Result<(), LifecycleError> {
        match app.state() {
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Failed => {
                return Err(LifecycleError::AlreadyFailed {
                    app: app.name().to_string(),
                })
            }
            LifecycleState::Idle | LifecycleState::Loading => {}
        }

        app.set_state(LifecycleState::Loading);
        let declarations = app.plugins().onload().to_vec();
        tracing::debug!(app = %app.name(), plugins = declarations.len(), "Initializing plugins");

        for declaration in declarations {
            let Some(handle) = declaration.module() else {
                continue;
            };
            let (completion, receiver) = Completion::channel(&declaration.name);

            let initialized = {
                let init = InitContext::new(&*app, &declaration.options, completion);
                let module = handle.module();
                let wait = async move {
                    match AssertUnwindSafe(module.initialize(init)).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(source)) => return Err(Fault::Error(source)),
                        Err(panic) => return Err(Fault::Error(panic_message(panic).into())),
                    }
                    receiver.await.map_err(|_| Fault::Abandoned)
                };
                tokio::time::timeout(self.init_timeout, wait).await
            };

            let value = match initialized {
                Ok(Ok(value)) => value,
                Ok(Err(Fault::Error(source))) => {
                    return Err(self.fail(app, LifecycleError::PluginInitFault {
                        plugin: declaration.name,
                        source,
                    }))
                }
                Ok(Err(Fault::Abandoned)) => {
                    return Err(self.fail(app, LifecycleError::InitAbandoned {
                        plugin: declaration.name,
                    }))
                }
                Err(_) => {
                    return Err(self.fail(app, LifecycleError::InitTimeout {
                        plugin: declaration.name,
                        timeout: self.init_timeout,
                    }))
                }
            };

            tracing::info!(app = %app.name(), plugin = %declaration.name, "Plugin initialized");
            app.bind_resource(&declaration.name, value);
        }

        app.set_state(LifecycleState::Ready);
        tracing::info!(app = %app.name(), "Plugins are ready");
        Ok(())
    }

    fn fail(&self, app: &mut App, error: LifecycleError) -> LifecycleError {
        tracing::error!(app = %app.name(), error = %error, "Plugin initialization failed");
        app.set_state(LifecycleState::Failed);
        error
    }
}

impl Default for LifecycleRunner {
    fn default() -> Self {
        Self::from_config(&PluginConfig::default())
    }
}

enum Fault {
    Error(BoxError),
    Abandoned,
}
