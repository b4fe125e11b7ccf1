//! Inspect APK manifests and install packages on Android devices over ADB.
//!
//! `parse` pulls `AndroidManifest.xml` out of a local or remote APK and reports the package
//! name and launcher activity. `install` streams a package into the device's temp directory
//! with live progress, runs `pm install` and removes the pushed file.

pub mod adb;
pub mod archive;
pub mod cli;
pub mod error;
pub mod install;
pub mod logging;
pub mod manifest;
pub mod passthrough;
pub mod settings;
pub mod source;
pub mod transfer;
pub mod utils;

pub use error::{Error, Result};
