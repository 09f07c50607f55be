//! Output renderers for bootstrap scripts

mod bash;

pub use bash::{BashRenderer, STEP_MARKER};

use crate::BootstrapScript;

/// A renderer that can convert a bootstrap script to some output format
pub trait Renderer {
    /// Output type
    type Output;
    /// Error type
    type Error;

    /// Render the script to the output format
    fn render(&self, script: &BootstrapScript) -> Result<Self::Output, Self::Error>;
}
