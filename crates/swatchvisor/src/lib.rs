//! # swatchvisor
//!
//! Keeps one `swatchdog` daemon running per log file, each configured from
//! the fragments found in a directory tree that mirrors the log paths:
//!
//! ```text
//! /etc/swatchvisor/
//! ├── var/log/auth.log/
//! │   ├── 10-ssh          fragment
//! │   ├── 20-sudo         fragment
//! │   └── .swatchrc       generated: 10-ssh + 20-sudo
//! └── var/log/nginx/error.log/
//!     └── upstream        fragment
//! ```
//!
//! [`SwatchProvider`] teaches the [`overseer`] engine how to find, configure
//! and launch these daemons.

pub mod command;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod output;
pub mod paths;
pub mod pidname;
pub mod provider;
pub mod settings;
pub mod tree;

pub use error::{Error, Result};
pub use provider::SwatchProvider;
pub use settings::Settings;
pub use tree::ConfigTree;
