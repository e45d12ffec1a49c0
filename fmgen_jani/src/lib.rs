//! JANI model container for the `fmgen` compiler.
//!
//! A [`Model`] collects global variables, constants, automata
//! and their [`Composition`], and (de)serializes them in JANI form.
//! The [`expand_random_variables`] pass compiles random distributions away,
//! as JANI model checkers only support finite probabilistic branching.

mod composition;
mod expansion;
mod model;

use anyhow::Context;
use log::info;
use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

pub use composition::{Composition, Sync};
pub use expansion::{ExpansionError, expand_distributions, expand_random_variables};
pub use model::{Feature, Model, ModelError};

/// Reads a JANI model from file.
pub fn load(path: &Path) -> anyhow::Result<Model> {
    let time = std::time::Instant::now();
    info!(target: "parser", "parsing JANI model file '{}'", path.display());
    let mut file =
        File::open(path).with_context(|| format!("failed to open file '{}'", path.display()))?;
    let size = file.metadata().map(|data| data.len()).unwrap_or_default();
    let mut buf = String::new();
    buf.reserve(size as usize);
    file.read_to_string(&mut buf)
        .with_context(|| format!("failed to read file '{}' to string", path.display()))?;
    let model: Model = serde_json::from_str(&buf)
        .with_context(|| format!("failed to parse JANI model in '{}'", path.display()))?;
    info!("parsing complete in {:?}", time.elapsed());
    Ok(model)
}

/// Writes a model to file in (pretty-printed) JANI form.
pub fn save(model: &Model, path: &Path) -> anyhow::Result<()> {
    let time = std::time::Instant::now();
    info!(target: "output", "writing JANI model to '{}'", path.display());
    let file = File::create(path)
        .with_context(|| format!("failed to create file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, model)
        .with_context(|| format!("failed to serialize model '{}'", model.name()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write file '{}'", path.display()))?;
    info!("writing complete in {:?}", time.elapsed());
    Ok(())
}
