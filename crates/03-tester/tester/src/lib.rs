//! Extension tester runtime.
//!
//! A [`TesterApp`] hosts one [`Extension`] on an engine context and drives it
//! from an [`ExtensionTester`] running on a separate tester context. Both
//! sides exchange commands, data and frames through one router; command
//! results are correlated by request id in a shared pending table.
//!
//! ```ignore
//! let app = TesterBuilder::new(TesterConfig::default())
//!     .set_test_mode_single("echo", r#"{"greeting": "hi"}"#)
//!     .build(Echo)?;
//! let report = app.run(PingTester)?;
//! ```

pub mod config;
pub mod env;
pub mod foreign;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod runner;

pub use config::TesterConfig;
pub use env::{EnvStats, ErrorHandler, TesterEnv};
pub use foreign::{ForeignCallback, ForeignStatus, ForeignTester};
pub use host::{Extension, ExtensionEnv};
pub use lifecycle::{LifecycleEvent, State};
pub use logging::{LogLevel, LogSite};
pub use runner::{ExtensionTester, RunReport, TesterApp, TesterBuilder};

pub use bridge::Handle;
pub use dispatch::{DispatchError, DispatchResult, ErrorCode, Outcome};
pub use msg::{AudioFrame, Cmd, CmdResult, Data, Loc, Message, RequestId, StatusCode, VideoFrame};
