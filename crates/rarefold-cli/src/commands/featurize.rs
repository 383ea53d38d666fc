use anyhow::Context;
use rarefold_config::ModelVariant;
use rarefold_features::{from_array_mapping, from_record, Example};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

pub fn execute(
    input: PathBuf,
    model: ModelVariant,
    seed: u64,
    output: PathBuf,
    unbatched: bool,
) -> anyhow::Result<()> {
    let bytes = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
    let record = Example::from_bytes(&bytes)
        .with_context(|| format!("parsing record {}", input.display()))?;
    let config = model.config()?;

    let features = if unbatched {
        from_array_mapping(&record.to_array_mapping(), &config, seed)?
    } else {
        from_record(&record, &config, seed)?
    };
    tracing::info!(
        variant = %model,
        features = features.len(),
        output = %output.display(),
        "writing features"
    );

    let tensors: HashMap<String, _> = features.into_iter().collect();
    candle_core::safetensors::save(&tensors, &output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}
