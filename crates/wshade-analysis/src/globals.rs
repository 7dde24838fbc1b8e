//! Uniformity of the standard shader-globals record.
//!
//! The renderer hands every batch one shader-globals struct. A handful
//! of its fields hold one value for the whole batch; the rest hold one
//! value per lane and make any dependent symbol varying.

/// The fields of the shader-globals record, in struct order, with
/// their batch uniformity.
const FIELDS: &[(&str, bool)] = &[
    // Uniform
    ("renderstate", true),
    ("tracedata", true),
    ("objdata", true),
    ("shadingcontext", true),
    ("renderer", true),
    ("Ci", true),
    ("raytype", true),
    ("pad0", true),
    ("pad1", true),
    ("pad2", true),
    // Varying
    ("P", false),
    ("dPdz", false),
    ("I", false),
    ("N", false),
    ("Ng", false),
    ("u", false),
    ("v", false),
    ("dPdu", false),
    ("dPdv", false),
    ("time", false),
    ("dtime", false),
    ("dPdtime", false),
    ("Ps", false),
    ("object2common", false),
    ("shader2common", false),
    ("surfacearea", false),
    ("flipHandedness", false),
    ("backfacing", false),
];

/// Looks up a global's uniformity by field name.
///
/// Returns `None` when the name is not a field of the shader-globals
/// record; callers treat that conservatively as varying.
pub fn shader_global_is_uniform(name: &str) -> Option<bool> {
    FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|&(_, is_uniform)| is_uniform)
}
