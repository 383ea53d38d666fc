use anyhow::Context;
use rarefold_config::ModelVariant;

pub fn execute(model: ModelVariant) -> anyhow::Result<()> {
    let config = model.config()?;
    let json = config
        .to_json_pretty()
        .with_context(|| format!("serializing config for {model}"))?;
    println!("{json}");
    Ok(())
}
