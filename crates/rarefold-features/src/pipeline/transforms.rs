//! Individual input transforms. Each reads and rewrites named entries of a
//! [`TensorDict`] in place.
use super::{MaskedMsa, PipelineError, PipelineSettings};
use crate::adapter::TensorDict;
use crate::array::ArrayValue;
use crate::residue_constants::{
    atom_maps_table, AAAtom, Residue, ATOM14_NUM, ATOM_TYPE_NUM, GAP_TOKEN,
    MAP_HHBLITS_AATYPE_TO_OUR_AATYPE, MASK_TOKEN, MSA_CLASSES, RESTYPE_NUM, RESTYPE_WITH_X,
    RESTYPE_WITH_X_AND_GAP,
};
use crate::schema::ElementKind;
use itertools::Itertools;
use ndarray::{
    aview1, Array1, Array2, Array3, ArrayD, ArrayView, Axis, Dimension, Ix1, Ix2, Ix3, Ix4, IxDyn,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rarefold_config::{Dim, DimBindings, FeatureShape};
use std::collections::BTreeMap;
use std::f32::consts::FRAC_2_PI;

type Result<T> = std::result::Result<T, PipelineError>;

/// Per-sequence features moved together when the MSA is resampled.
const MSA_FEATURE_NAMES: [&str; 6] = [
    "msa",
    "deletion_matrix",
    "msa_mask",
    "msa_row_mask",
    "bert_mask",
    "true_msa",
];

// Helper Fns --------------------------------------

fn ints<'a>(t: &'a TensorDict, name: &str) -> Result<&'a ArrayD<i64>> {
    match t.get(name) {
        Some(ArrayValue::Int(a)) => Ok(a),
        Some(other) => Err(PipelineError::WrongKind {
            name: name.to_string(),
            expected: ElementKind::Int,
            found: other.kind(),
        }),
        None => Err(PipelineError::MissingFeature(name.to_string())),
    }
}

fn floats<'a>(t: &'a TensorDict, name: &str) -> Result<&'a ArrayD<f32>> {
    match t.get(name) {
        Some(ArrayValue::Float(a)) => Ok(a),
        Some(other) => Err(PipelineError::WrongKind {
            name: name.to_string(),
            expected: ElementKind::Float,
            found: other.kind(),
        }),
        None => Err(PipelineError::MissingFeature(name.to_string())),
    }
}

/// View `a` with a fixed rank.
fn fixed<'a, T, D: Dimension>(name: &str, a: &'a ArrayD<T>) -> Result<ArrayView<'a, T, D>> {
    a.view().into_dimensionality::<D>().map_err(|_| {
        PipelineError::bad_shape(name, a.shape(), format!("expected rank {}", D::NDIM.unwrap_or(0)))
    })
}

fn leading_dim(t: &TensorDict, name: &str) -> Option<usize> {
    t.get(name).and_then(|v| v.shape().first().copied())
}

/// Index of the first maximum; 0 for an empty row.
fn argmax(values: impl IntoIterator<Item = f32>) -> usize {
    values
        .into_iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

fn class(value: i64, depth: usize) -> Option<usize> {
    usize::try_from(value).ok().filter(|&c| c < depth)
}

/// Squash deletion counts into [0, 1).
fn deletion_value(count: f32) -> f32 {
    (count / 3.0).atan() * FRAC_2_PI
}

fn scalar<T: Clone>(value: T) -> ArrayD<T> {
    ArrayD::from_elem(IxDyn(&[]), value)
}

// Shared transforms --------------------------------------

pub(crate) fn add_distillation_flag(t: &mut TensorDict) {
    t.insert("is_distillation".into(), scalar(0.0f32).into());
}

/// Map HHblits residue codes onto the model alphabet.
pub(crate) fn correct_msa_restypes(t: &mut TensorDict) -> Result<()> {
    let msa = ints(t, "msa")?;
    let table = MAP_HHBLITS_AATYPE_TO_OUR_AATYPE;
    if let Some(&bad) = msa.iter().find(|&&v| class(v, table.len()).is_none()) {
        return Err(PipelineError::InvalidValue {
            name: "msa".into(),
            reason: format!("residue code {bad} is outside the alignment alphabet"),
        });
    }
    let mapped = msa.mapv(|v| table[v as usize]);
    t.insert("msa".into(), mapped.into());
    Ok(())
}

/// Collapse the one-hot residue types to residue indices.
pub(crate) fn squeeze_features(t: &mut TensorDict) -> Result<()> {
    let one_hot = fixed::<_, Ix2>("aatype", floats(t, "aatype")?)?;
    let aatype: Array1<i64> = one_hot
        .rows()
        .into_iter()
        .map(|row| argmax(row.iter().copied()) as i64)
        .collect();
    t.insert("aatype".into(), aatype.into_dyn().into());
    Ok(())
}

pub(crate) fn make_seq_mask(t: &mut TensorDict) -> Result<()> {
    let num_res = ints(t, "aatype")?.len();
    t.insert("seq_mask".into(), ArrayD::<f32>::ones(IxDyn(&[num_res])).into());
    Ok(())
}

pub(crate) fn make_msa_mask(t: &mut TensorDict) -> Result<()> {
    let msa = fixed::<_, Ix2>("msa", ints(t, "msa")?)?;
    let (rows, res) = msa.dim();
    t.insert("msa_mask".into(), Array2::<f32>::ones((rows, res)).into_dyn().into());
    t.insert("msa_row_mask".into(), Array1::<f32>::ones(rows).into_dyn().into());
    Ok(())
}

/// Per-residue frequency of each of the 22 MSA classes.
pub(crate) fn make_hhblits_profile(t: &mut TensorDict) -> Result<()> {
    if t.contains_key("hhblits_profile") {
        return Ok(());
    }
    let msa = fixed::<_, Ix2>("msa", ints(t, "msa")?)?;
    let (rows, res) = msa.dim();
    let mut profile = Array2::<f32>::zeros((res, RESTYPE_WITH_X_AND_GAP));
    for ((_, r), &aa) in msa.indexed_iter() {
        if let Some(c) = class(aa, RESTYPE_WITH_X_AND_GAP) {
            profile[[r, c]] += 1.0;
        }
    }
    if rows > 0 {
        profile /= rows as f32;
    }
    t.insert("hhblits_profile".into(), profile.into_dyn().into());
    Ok(())
}

/// One-hot HHblits template residues to model residue indices.
pub(crate) fn fix_templates_aatype(t: &mut TensorDict) -> Result<()> {
    let one_hot = fixed::<_, Ix3>("template_aatype", floats(t, "template_aatype")?)?;
    let (templates, res, _) = one_hot.dim();
    let table = MAP_HHBLITS_AATYPE_TO_OUR_AATYPE;
    let indices = one_hot
        .lanes(Axis(2))
        .into_iter()
        .map(|lane| table.get(argmax(lane.iter().copied())).copied().unwrap_or(GAP_TOKEN))
        .collect_vec();
    let aatype = Array2::from_shape_vec((templates, res), indices)
        .map_err(|e| PipelineError::bad_shape("template_aatype", &[templates, res], e.to_string()))?;
    t.insert("template_aatype".into(), aatype.into_dyn().into());
    Ok(())
}

pub(crate) fn make_template_mask(t: &mut TensorDict) -> Result<()> {
    let templates = leading_dim(t, "template_aatype")
        .ok_or_else(|| PipelineError::MissingFeature("template_aatype".into()))?;
    t.insert("template_mask".into(), Array1::<f32>::ones(templates).into_dyn().into());
    Ok(())
}

/// Beta-carbon positions (alpha carbon for glycine) and their masks.
pub(crate) fn make_pseudo_beta(t: &mut TensorDict, prefix: &str) -> Result<()> {
    let aatype_name = format!("{prefix}aatype");
    let positions_name = format!("{prefix}all_atom_positions");
    let masks_name = format!("{prefix}all_atom_masks");
    let aatype = fixed::<_, Ix2>(&aatype_name, ints(t, &aatype_name)?)?;
    let positions = fixed::<_, Ix4>(&positions_name, floats(t, &positions_name)?)?;
    let masks = fixed::<_, Ix3>(&masks_name, floats(t, &masks_name)?)?;
    let (templates, res) = aatype.dim();
    if positions.dim() != (templates, res, ATOM_TYPE_NUM, 3) {
        return Err(PipelineError::bad_shape(&positions_name, positions.shape(), "does not match the residue types"));
    }
    if masks.dim() != (templates, res, ATOM_TYPE_NUM) {
        return Err(PipelineError::bad_shape(&masks_name, masks.shape(), "does not match the residue types"));
    }
    let ca = AAAtom::CA as usize;
    let cb = AAAtom::CB as usize;
    let gly = Residue::GLY.to_int();
    let mut beta = Array3::<f32>::zeros((templates, res, 3));
    let mut beta_mask = Array2::<f32>::zeros((templates, res));
    for ((i, j), &aa) in aatype.indexed_iter() {
        let atom = if aa == gly { ca } else { cb };
        for k in 0..3 {
            beta[[i, j, k]] = positions[[i, j, atom, k]];
        }
        beta_mask[[i, j]] = masks[[i, j, atom]];
    }
    t.insert(format!("{prefix}pseudo_beta"), beta.into_dyn().into());
    t.insert(format!("{prefix}pseudo_beta_mask"), beta_mask.into_dyn().into());
    Ok(())
}

/// Compact-to-full atom index maps and existence masks per residue.
pub(crate) fn make_atom14_masks(t: &mut TensorDict) -> Result<()> {
    let aatype = fixed::<_, Ix1>("aatype", ints(t, "aatype")?)?;
    let res = aatype.len();
    let table = atom_maps_table();
    let mut to37 = Array2::<i64>::zeros((res, ATOM14_NUM));
    let mut to14 = Array2::<i64>::zeros((res, ATOM_TYPE_NUM));
    let mut exists14 = Array2::<f32>::zeros((res, ATOM14_NUM));
    let mut exists37 = Array2::<f32>::zeros((res, ATOM_TYPE_NUM));
    for (i, &aa) in aatype.iter().enumerate() {
        let maps = &table[Residue::from_int(aa).to_int() as usize];
        to37.row_mut(i).assign(&aview1(&maps.atom14_to_atom37));
        to14.row_mut(i).assign(&aview1(&maps.atom37_to_atom14));
        exists14.row_mut(i).assign(&aview1(&maps.atom14_exists));
        exists37.row_mut(i).assign(&aview1(&maps.atom37_exists));
    }
    t.insert("residx_atom14_to_atom37".into(), to37.into_dyn().into());
    t.insert("residx_atom37_to_atom14".into(), to14.into_dyn().into());
    t.insert("atom14_atom_exists".into(), exists14.into_dyn().into());
    t.insert("atom37_atom_exists".into(), exists37.into_dyn().into());
    Ok(())
}

/// Seed shared by every ensemble pass so they all crop the same window.
pub(crate) fn make_random_crop_to_size_seed<R: Rng>(t: &mut TensorDict, rng: &mut R) {
    let seed: Array1<i64> = (0..2)
        .map(|_| rng.gen_range(i64::from(i32::MIN)..i64::from(i32::MAX)))
        .collect();
    t.insert("random_crop_to_size_seed".into(), seed.into_dyn().into());
}

// Ensembled transforms --------------------------------------

/// Keep the query row plus a random subset of the remaining rows as cluster
/// centres; every unselected row moves to the `extra_` features.
pub(crate) fn sample_msa<R: Rng>(t: &mut TensorDict, max_seq: usize, rng: &mut R) -> Result<()> {
    let num_seq = leading_dim(t, "msa").ok_or_else(|| PipelineError::MissingFeature("msa".into()))?;
    for name in MSA_FEATURE_NAMES {
        if let Some(value) = t.get(name) {
            if value.shape().first() != Some(&num_seq) {
                return Err(PipelineError::bad_shape(
                    name,
                    value.shape(),
                    format!("expected {num_seq} msa rows"),
                ));
            }
        }
    }
    let mut order: Vec<usize> = (1..num_seq).collect();
    order.shuffle(rng);
    if num_seq > 0 {
        order.insert(0, 0);
    }
    let (selected, rest) = order.split_at(max_seq.min(num_seq));
    for name in MSA_FEATURE_NAMES {
        if let Some(value) = t.remove(name) {
            t.insert(format!("extra_{name}"), value.take(0, rest));
            t.insert(name.to_string(), value.take(0, selected));
        }
    }
    Ok(())
}

/// BERT-style corruption of the cluster centres. Each position is replaced
/// with probability `replace_fraction` by a draw from a mix of the uniform
/// residue distribution, the MSA profile, the original residue and the mask
/// token.
pub(crate) fn make_masked_msa<R: Rng>(
    t: &mut TensorDict,
    probs: &MaskedMsa,
    replace_fraction: f64,
    rng: &mut R,
) -> Result<()> {
    let msa = fixed::<_, Ix2>("msa", ints(t, "msa")?)?.to_owned();
    let profile = fixed::<_, Ix2>("hhblits_profile", floats(t, "hhblits_profile")?)?;
    let (rows, res) = msa.dim();
    if profile.dim() != (res, RESTYPE_WITH_X_AND_GAP) {
        return Err(PipelineError::bad_shape("hhblits_profile", profile.shape(), "does not match the msa"));
    }
    let mask_prob = 1.0 - probs.profile_prob - probs.same_prob - probs.uniform_prob;
    let mut bert = msa.clone();
    let mut bert_mask = Array2::<f32>::zeros((rows, res));
    let mut weights = [0f64; MSA_CLASSES];
    for ((s, r), &aa) in msa.indexed_iter() {
        if rng.gen::<f64>() >= replace_fraction {
            continue;
        }
        for (c, w) in weights.iter_mut().enumerate() {
            *w = match c {
                c if c == MASK_TOKEN as usize => mask_prob,
                c => {
                    let uniform = if c < RESTYPE_NUM { 0.05 } else { 0.0 };
                    let same = if class(aa, MSA_CLASSES) == Some(c) { 1.0 } else { 0.0 };
                    probs.uniform_prob * uniform
                        + probs.profile_prob * f64::from(profile[[r, c]])
                        + probs.same_prob * same
                }
            };
        }
        if let Some(c) = sample_categorical(&weights, rng) {
            bert[[s, r]] = c as i64;
        }
        bert_mask[[s, r]] = 1.0;
    }
    t.insert("bert_mask".into(), bert_mask.into_dyn().into());
    t.insert("true_msa".into(), msa.into_dyn().into());
    t.insert("msa".into(), bert.into_dyn().into());
    Ok(())
}

fn sample_categorical<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let mut target = rng.gen::<f64>() * total;
    let mut last = None;
    for (c, &w) in weights.iter().enumerate().filter(|(_, w)| **w > 0.0) {
        if target < w {
            return Some(c);
        }
        target -= w;
        last = Some(c);
    }
    last
}

/// Assign every extra sequence to the cluster centre it agrees with most.
pub(crate) fn nearest_neighbor_clusters(t: &mut TensorDict, gap_agreement_weight: f32) -> Result<()> {
    let msa = fixed::<_, Ix2>("msa", ints(t, "msa")?)?;
    let msa_mask = fixed::<_, Ix2>("msa_mask", floats(t, "msa_mask")?)?;
    let extra = fixed::<_, Ix2>("extra_msa", ints(t, "extra_msa")?)?;
    let extra_mask = fixed::<_, Ix2>("extra_msa_mask", floats(t, "extra_msa_mask")?)?;
    let (centres, res) = msa.dim();
    let (num_extra, extra_res) = extra.dim();
    if extra_res != res && num_extra > 0 {
        return Err(PipelineError::bad_shape("extra_msa", extra.shape(), "residue count differs from the msa"));
    }
    if centres == 0 && num_extra > 0 {
        return Err(PipelineError::InvalidValue {
            name: "msa".into(),
            reason: "no cluster centres to assign extra sequences to".into(),
        });
    }
    let weight = |c: usize| match c {
        c if c < RESTYPE_WITH_X => 1.0,
        c if c == RESTYPE_WITH_X => gap_agreement_weight,
        _ => 0.0,
    };
    let assignment: Array1<i64> = (0..num_extra)
        .map(|n| {
            let agreement = (0..centres).map(|m| {
                (0..res)
                    .filter_map(|r| {
                        let c = class(msa[[m, r]], MSA_CLASSES)?;
                        (class(extra[[n, r]], MSA_CLASSES) == Some(c))
                            .then(|| extra_mask[[n, r]] * msa_mask[[m, r]] * weight(c))
                    })
                    .sum::<f32>()
            });
            argmax(agreement) as i64
        })
        .collect();
    t.insert("extra_cluster_assignment".into(), assignment.into_dyn().into());
    Ok(())
}

/// Profile and mean deletion count of each cluster, centre included.
pub(crate) fn summarize_clusters(t: &mut TensorDict) -> Result<()> {
    let msa = fixed::<_, Ix2>("msa", ints(t, "msa")?)?;
    let msa_mask = fixed::<_, Ix2>("msa_mask", floats(t, "msa_mask")?)?;
    let deletions = fixed::<_, Ix2>("deletion_matrix", floats(t, "deletion_matrix")?)?;
    let extra = fixed::<_, Ix2>("extra_msa", ints(t, "extra_msa")?)?;
    let extra_mask = fixed::<_, Ix2>("extra_msa_mask", floats(t, "extra_msa_mask")?)?;
    let extra_deletions = fixed::<_, Ix2>("extra_deletion_matrix", floats(t, "extra_deletion_matrix")?)?;
    let assignment = fixed::<_, Ix1>("extra_cluster_assignment", ints(t, "extra_cluster_assignment")?)?;
    let (centres, res) = msa.dim();
    if msa_mask.dim() != msa.dim() || deletions.dim() != msa.dim() {
        return Err(PipelineError::bad_shape("msa_mask", msa_mask.shape(), "does not match the msa"));
    }
    let num_extra = assignment.len();
    if extra.dim() != (num_extra, res) || extra_mask.dim() != extra.dim() || extra_deletions.dim() != extra.dim() {
        return Err(PipelineError::bad_shape("extra_msa", extra.shape(), "does not match the cluster assignment"));
    }
    if let Some(&bad) = assignment.iter().find(|&&m| class(m, centres).is_none()) {
        return Err(PipelineError::InvalidValue {
            name: "extra_cluster_assignment".into(),
            reason: format!("cluster {bad} does not exist"),
        });
    }

    let mut counts = msa_mask.mapv(|m| m + 1e-6);
    let mut msa_sum = Array3::<f32>::zeros((centres, res, MSA_CLASSES));
    for ((m, r), &aa) in msa.indexed_iter() {
        if let Some(c) = class(aa, MSA_CLASSES) {
            msa_sum[[m, r, c]] += 1.0;
        }
    }
    let mut del_sum = deletions.to_owned();
    for (n, &cluster) in assignment.iter().enumerate() {
        let m = cluster as usize;
        for r in 0..res {
            let w = extra_mask[[n, r]];
            counts[[m, r]] += w;
            del_sum[[m, r]] += w * extra_deletions[[n, r]];
            if let Some(c) = class(extra[[n, r]], MSA_CLASSES) {
                msa_sum[[m, r, c]] += w;
            }
        }
    }
    let profile = &msa_sum / &counts.view().insert_axis(Axis(2));
    let deletion_mean = &del_sum / &counts;
    t.insert("cluster_profile".into(), profile.into_dyn().into());
    t.insert("cluster_deletion_mean".into(), deletion_mean.into_dyn().into());
    Ok(())
}

/// Keep a random subset of at most `max_extra` extra sequences.
pub(crate) fn crop_extra_msa<R: Rng>(t: &mut TensorDict, max_extra: usize, rng: &mut R) -> Result<()> {
    let Some(num_seq) = leading_dim(t, "extra_msa") else {
        return Ok(());
    };
    let mut keep: Vec<usize> = (0..num_seq).collect();
    keep.shuffle(rng);
    keep.truncate(max_extra.min(num_seq));
    for name in MSA_FEATURE_NAMES {
        let key = format!("extra_{name}");
        if let Some(value) = t.get(&key) {
            let cropped = value.take(0, &keep);
            t.insert(key, cropped);
        }
    }
    Ok(())
}

pub(crate) fn delete_extra_msa(t: &mut TensorDict) {
    for name in MSA_FEATURE_NAMES {
        t.remove(&format!("extra_{name}"));
    }
}

/// Model inputs: `target_feat`, `msa_feat` and the extra-MSA deletion
/// features.
pub(crate) fn make_msa_feat(t: &mut TensorDict) -> Result<()> {
    let aatype = fixed::<_, Ix1>("aatype", ints(t, "aatype")?)?;
    let breaks = fixed::<_, Ix1>("between_segment_residues", ints(t, "between_segment_residues")?)?;
    let res = aatype.len();
    if breaks.len() != res {
        return Err(PipelineError::bad_shape("between_segment_residues", breaks.shape(), "does not match aatype"));
    }
    let mut target_feat = Array2::<f32>::zeros((res, 1 + RESTYPE_WITH_X));
    for (r, (&aa, &brk)) in aatype.iter().zip(breaks.iter()).enumerate() {
        target_feat[[r, 0]] = brk.clamp(0, 1) as f32;
        if let Some(c) = class(aa, RESTYPE_WITH_X) {
            target_feat[[r, 1 + c]] = 1.0;
        }
    }

    let msa = fixed::<_, Ix2>("msa", ints(t, "msa")?)?;
    let deletions = fixed::<_, Ix2>("deletion_matrix", floats(t, "deletion_matrix")?)?;
    if deletions.dim() != msa.dim() {
        return Err(PipelineError::bad_shape("deletion_matrix", deletions.shape(), "does not match the msa"));
    }
    let clusters = match (t.get("cluster_profile"), t.get("cluster_deletion_mean")) {
        (Some(_), Some(_)) => Some((
            fixed::<_, Ix3>("cluster_profile", floats(t, "cluster_profile")?)?,
            fixed::<_, Ix2>("cluster_deletion_mean", floats(t, "cluster_deletion_mean")?)?,
        )),
        _ => None,
    };
    let (rows, cols) = msa.dim();
    if let Some((profile, mean)) = &clusters {
        if profile.dim() != (rows, cols, MSA_CLASSES) || mean.dim() != (rows, cols) {
            return Err(PipelineError::bad_shape("cluster_profile", profile.shape(), "does not match the msa"));
        }
    }
    let channels = MSA_CLASSES + 2 + if clusters.is_some() { MSA_CLASSES + 1 } else { 0 };
    let mut msa_feat = Array3::<f32>::zeros((rows, cols, channels));
    for ((i, j), &aa) in msa.indexed_iter() {
        if let Some(c) = class(aa, MSA_CLASSES) {
            msa_feat[[i, j, c]] = 1.0;
        }
        let d = deletions[[i, j]];
        msa_feat[[i, j, MSA_CLASSES]] = d.clamp(0.0, 1.0);
        msa_feat[[i, j, MSA_CLASSES + 1]] = deletion_value(d);
        if let Some((profile, mean)) = &clusters {
            let base = MSA_CLASSES + 2;
            for c in 0..MSA_CLASSES {
                msa_feat[[i, j, base + c]] = profile[[i, j, c]];
            }
            msa_feat[[i, j, base + MSA_CLASSES]] = deletion_value(mean[[i, j]]);
        }
    }

    let extra = match t.get("extra_deletion_matrix") {
        Some(_) => {
            let d = floats(t, "extra_deletion_matrix")?;
            Some((d.mapv(|x| x.clamp(0.0, 1.0)), d.mapv(deletion_value)))
        }
        None => None,
    };
    t.insert("target_feat".into(), target_feat.into_dyn().into());
    t.insert("msa_feat".into(), msa_feat.into_dyn().into());
    if let Some((has_deletion, value)) = extra {
        t.insert("extra_has_deletion".into(), has_deletion.into());
        t.insert("extra_deletion_value".into(), value.into());
    }
    Ok(())
}

/// Keep only the features with a declared output shape.
pub(crate) fn select_feat(t: &mut TensorDict, feat: &BTreeMap<String, FeatureShape>) {
    t.retain(|name, _| feat.contains_key(name));
}

fn crop_rng(seed: &ArrayD<i64>) -> StdRng {
    let state = seed
        .iter()
        .fold(0u64, |acc, &v| (acc << 32) | (v as u64 & 0xffff_ffff));
    StdRng::seed_from_u64(state)
}

/// Crop residues to `crop_size` and templates to `max_templates`, using the
/// shared crop seed.
pub(crate) fn random_crop_to_size(t: &mut TensorDict, settings: &PipelineSettings) -> Result<()> {
    let mut rng = crop_rng(ints(t, "random_crop_to_size_seed")?);
    let seq_length = t
        .get("seq_length")
        .and_then(ArrayValue::first_int)
        .ok_or_else(|| PipelineError::MissingFeature("seq_length".into()))?;
    let seq_length = usize::try_from(seq_length).map_err(|_| PipelineError::InvalidValue {
        name: "seq_length".into(),
        reason: format!("{seq_length} is negative"),
    })?;
    let num_templates = leading_dim(t, "template_aatype").unwrap_or(0);

    let templates_start = if settings.subsample_templates {
        rng.gen_range(0..=num_templates)
    } else {
        0
    };
    let templates_len = settings.max_templates.min(num_templates - templates_start);
    let res_len = settings.crop_size.min(seq_length);
    let res_start = rng.gen_range(0..=seq_length - res_len);
    let mut template_order: Vec<usize> = (0..num_templates).collect();
    if settings.subsample_templates {
        template_order.shuffle(&mut rng);
    }

    for (name, value) in t.iter_mut() {
        let Some(shape) = settings.feat.get(name) else {
            continue;
        };
        if !shape.dims().iter().any(|d| matches!(d, Dim::NumRes | Dim::NumTemplates)) {
            continue;
        }
        if value.shape().len() != shape.rank() {
            return Err(PipelineError::bad_shape(name, value.shape(), format!("expected rank {}", shape.rank())));
        }
        let mut cropped = value.clone();
        for (axis, dim) in shape.dims().iter().enumerate() {
            let (start, len) = match dim {
                Dim::NumTemplates if name.starts_with("template") => {
                    if settings.subsample_templates {
                        cropped = cropped.take(axis, &template_order);
                    }
                    (templates_start, templates_len)
                }
                Dim::NumRes => (res_start, res_len),
                _ => continue,
            };
            if cropped.shape()[axis] < start + len {
                return Err(PipelineError::bad_shape(
                    name,
                    cropped.shape(),
                    format!("axis {axis} is shorter than the crop {start}..{}", start + len),
                ));
            }
            cropped = cropped.crop(axis, start, len);
        }
        *value = cropped;
    }
    t.insert("seq_length".into(), scalar(res_len as i64).into());
    Ok(())
}

/// Zero-pad every feature to its declared shape at the configured sizes.
pub(crate) fn make_fixed_size(t: &mut TensorDict, settings: &PipelineSettings) -> Result<()> {
    let sizes = DimBindings {
        num_res: Some(settings.crop_size),
        num_msa_seq: Some(settings.max_msa_clusters),
        num_extra_seq: Some(settings.max_extra_msa),
        num_templates: Some(settings.max_templates),
    };
    for (name, value) in t.iter_mut() {
        let shape = settings
            .feat
            .get(name)
            .ok_or_else(|| PipelineError::bad_shape(name, value.shape(), "has no declared shape"))?;
        let target = shape.resolve(&sizes)?;
        let padded = value.pad_to(&target).ok_or_else(|| {
            PipelineError::bad_shape(name, value.shape(), format!("does not fit {target:?}"))
        })?;
        *value = padded;
    }
    Ok(())
}
