//! Per-input data config and the raw feature names to request.
use rarefold_config::{Config, ConfigError};
use tracing::debug;

/// Specialize `config` for an input of `num_res` residues.
///
/// Returns a deep copy of the `data` subtree with `eval.crop_size` set to
/// `num_res`, and the raw feature names the adapters should parse: the
/// unsupervised features, followed by the template features when
/// `common.use_templates` is set.
pub fn make_data_config(
    config: &Config,
    num_res: usize,
) -> Result<(Config, Vec<String>), ConfigError> {
    let data = config.subtree("data")?;

    let mut feature_names = data.str_list("common.unsupervised_features")?;
    if data.bool("common.use_templates")? {
        feature_names.extend(data.str_list("common.template_features")?);
    }

    let data = {
        let mut edit = data.edit();
        edit.define("eval.crop_size", num_res)?;
        edit.commit()
    };
    debug!(num_res, features = feature_names.len(), "made data config");
    Ok((data, feature_names))
}
