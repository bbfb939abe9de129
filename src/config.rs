//! Command line handling.
//!
//! The viewer takes free-standing tokens rather than flags: `fullscreen`
//! (any case) switches to a borderless maximized window, and one other token
//! names the source to connect to directly. Without a source name the viewer
//! waits for the first source discovery reports.

use log::warn;

use crate::transport::Source;

/// Token that turns on fullscreen mode, compared case-insensitively.
pub const FULLSCREEN_TOKEN: &str = "fullscreen";

/// What the viewer was asked to do at launch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub fullscreen: bool,
    /// Source name to connect to without discovery.
    pub source_name: Option<String>,
}

impl LaunchOptions {
    /// Parses the arguments after the program name.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();

        for arg in args {
            let token = arg.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            if token.eq_ignore_ascii_case(FULLSCREEN_TOKEN) {
                options.fullscreen = true;
            } else if options.source_name.is_none() {
                options.source_name = Some(token.to_string());
            } else {
                warn!("Ignoring extra argument '{}'", token);
            }
        }

        options
    }

    /// Parses [`std::env::args`], skipping the program name.
    pub fn from_env() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    /// The source to connect to directly, or `None` for discovery mode.
    pub fn source(&self) -> Option<Source> {
        self.source_name.as_deref().map(Source::new)
    }

    pub fn is_discovery(&self) -> bool {
        self.source_name.is_none()
    }
}
