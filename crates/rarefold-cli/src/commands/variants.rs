use rarefold_config::ModelVariant;
use strum::IntoEnumIterator;

pub fn execute() -> anyhow::Result<()> {
    for variant in ModelVariant::iter() {
        println!("{variant}");
    }
    Ok(())
}
