use anyhow::{Context as _, Result};
use std::path::Path;
use tera::Tera;
use tracing::debug;

use crate::utils::fs::write_file;

/// Thin wrapper around the Tera engine, loaded once from the templates
/// directory. A malformed template anywhere in the directory fails the
/// load, before any scratch state exists.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let glob = format!("{}/**/*", dir.display());
        let tera = Tera::new(&glob)
            .with_context(|| format!("Failed to load templates from: {}", dir.display()))?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &tera::Context) -> Result<String> {
        debug!("Rendering template: {}", name);
        self.tera
            .render(name, context)
            .with_context(|| format!("Failed to render template: {name}"))
    }

    pub fn render_to_file(
        &self,
        name: &str,
        context: &tera::Context,
        output: &Path,
    ) -> Result<()> {
        let rendered = self.render(name, context)?;
        write_file(output, rendered.as_bytes())
    }
}
