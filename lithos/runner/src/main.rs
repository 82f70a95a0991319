//! Headless runner: load a preset image or a saved model, advance it, write the saved model.
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::dbg_macro, clippy::large_enum_variant)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;

use lithos_engine::grid::Grid;
use lithos_engine::migration::{migrate, Migrated};
use lithos_engine::preset::PresetImage;
use lithos_engine::spatial_index::SpatialIndex;
use lithos_engine::worker::{Inbound, Outbound, Worker};

#[derive(Parser, Debug)]
#[command(name = "lithos-runner", about = "Advance a plate model without a viewer")]
struct Args {
    /// Preset PNG: equirectangular plate map (red/blue = plate, green = continent)
    #[arg(long, conflicts_with = "state")]
    preset: Option<PathBuf>,

    /// Saved model JSON (any supported version)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Steps to run
    #[arg(long, default_value = "100")]
    steps: u64,

    /// Grid frequency for presets (saved models carry their own)
    #[arg(long, default_value = "32")]
    frequency: u32,

    /// JSON file with a partial props object
    #[arg(long)]
    props: Option<PathBuf>,

    /// Where to write the saved model
    #[arg(short, long, default_value = "model.json")]
    out: PathBuf,

    /// Grid cache file, read if present and written otherwise
    #[arg(long)]
    grid_cache: Option<PathBuf>,
}

fn load_grid(frequency: u32, cache: Option<&Path>) -> Result<Grid> {
    if let Some(path) = cache {
        if path.exists() {
            match Grid::load_cache(path) {
                Ok(g) if g.frequency == frequency => {
                    log::info!("[grid] loaded cache {}", path.display());
                    return Ok(g);
                }
                Ok(g) => log::warn!("[grid] cache has F={}, need F={frequency}", g.frequency),
                Err(e) => log::warn!("[grid] cache unreadable: {e}"),
            }
        }
    }
    let g = Grid::new(frequency);
    log::info!("[grid] F={} cells={}", g.frequency, g.cells);
    if let Some(path) = cache {
        g.save_cache(path).with_context(|| format!("writing grid cache {}", path.display()))?;
    }
    Ok(g)
}

fn load_preset(path: &Path) -> Result<PresetImage> {
    let img = image::open(path).with_context(|| format!("opening preset {}", path.display()))?.to_rgba8();
    Ok(PresetImage { width: img.width(), height: img.height(), data: img.into_raw() })
}

fn check(outbox: Vec<Outbound>) -> Result<Vec<Outbound>> {
    for msg in &outbox {
        match msg {
            Outbound::Error { message } => bail!("engine error: {message}"),
            Outbound::IncompatibleModel => bail!("saved model is too old to load"),
            _ => {}
        }
    }
    Ok(outbox)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (load, frequency) = if let Some(path) = &args.state {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let raw: Value = serde_json::from_str(&text)?;
        let frequency = match migrate(raw.clone())? {
            Migrated::Document(doc) => doc.model_state.grid_frequency,
            Migrated::IncompatibleModel => bail!("{} predates the oldest supported version", path.display()),
        };
        (Inbound::LoadModel { serialized_state: raw }, frequency)
    } else if let Some(path) = &args.preset {
        (Inbound::LoadPreset { image: load_preset(path)? }, args.frequency)
    } else {
        bail!("pass --preset or --state");
    };

    let grid = load_grid(frequency, args.grid_cache.as_deref())?;
    let index = Arc::new(SpatialIndex::new(Arc::new(grid)));
    let mut worker = Worker::new(index);

    if let Some(path) = &args.props {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        worker.post(Inbound::Props { props: serde_json::from_str(&text)? });
    }
    worker.post(load);
    check(worker.drain())?;

    let report_every = (args.steps / 10).max(1);
    for i in 1..=args.steps {
        worker.post(Inbound::StepForward);
        check(worker.drain())?;
        if i % report_every == 0 {
            if let Some(model) = worker.model() {
                log::info!(
                    "[runner] step {} t={:.2} plates={}",
                    model.step_idx(),
                    model.time(),
                    model.plates().len()
                );
            }
        }
    }

    worker.post(Inbound::SaveModel);
    let saved = check(worker.drain())?.into_iter().find_map(|m| match m {
        Outbound::SavedModel { serialized_state } => Some(serialized_state),
        _ => None,
    });
    let Some(doc) = saved else { bail!("engine produced no saved model") };
    fs::write(&args.out, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("writing {}", args.out.display()))?;
    println!("[runner] wrote {}", args.out.display());
    Ok(())
}
