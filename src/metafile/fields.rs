//! Post-hash edits of a freshly built descriptor.
//!
//! [`apply`] runs once between hashing and serialization. It handles the two
//! cross-seeding switches and then the user's `--set` edits, in that order.
//! Without [`CrossSeed::Entropy`] the result depends only on the inputs.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use rand::Rng;

use super::builder::CROSS_SEED_FIELD;
use super::descriptor::Descriptor;
use super::error::MetafileError;
use crate::bencode::Value;

/// Cross-seed label value that asks for a random label instead.
pub const ENTROPY_SENTINEL: &str = "@entropy";

/// Size of the random `entropy` field.
pub const ENTROPY_BITS: usize = 512;

/// Info dictionary field holding an explicit cross-seed label.
pub const LABEL_FIELD: &str = "x_cross_seed_label";

/// Info dictionary field holding random cross-seed entropy.
pub const ENTROPY_FIELD: &str = "entropy";

/// How to make the info hash of a build distinct from other builds of the same data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossSeed {
    /// Record this label verbatim in [`LABEL_FIELD`].
    Label(String),
    /// Record [`ENTROPY_BITS`] random bits in [`ENTROPY_FIELD`].
    Entropy,
}

impl CrossSeed {
    /// Interprets a `--cross-seed` argument; [`ENTROPY_SENTINEL`] selects entropy.
    pub fn from_arg(arg: &str) -> Self {
        if arg == ENTROPY_SENTINEL {
            CrossSeed::Entropy
        } else {
            CrossSeed::Label(arg.to_string())
        }
    }
}

/// A single `key=value` assignment or bare `key` deletion.
///
/// Keys are dotted paths into nested dictionaries (`info.source`); write `..`
/// for a literal dot. Values made of an optional sign and digits are stored as
/// integers, everything else as byte strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    Assign { path: Vec<String>, value: Value },
    Delete { path: Vec<String> },
}

impl FieldEdit {
    pub fn path(&self) -> &[String] {
        match self {
            FieldEdit::Assign { path, .. } | FieldEdit::Delete { path } => path,
        }
    }

    fn key(&self) -> String {
        self.path()
            .iter()
            .map(|k| k.replace('.', ".."))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl FromStr for FieldEdit {
    type Err = MetafileError;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (arg, None),
        };

        let path = parse_key_path(key)?;
        Ok(match value {
            Some(value) => FieldEdit::Assign {
                path,
                value: infer_value(value),
            },
            None => FieldEdit::Delete { path },
        })
    }
}

impl fmt::Display for FieldEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldEdit::Assign { value, .. } => match value {
                Value::Integer(i) => write!(f, "{}={}", self.key(), i),
                other => write!(
                    f,
                    "{}={}",
                    self.key(),
                    other
                        .as_bytes()
                        .map(|b| String::from_utf8_lossy(b).into_owned())
                        .unwrap_or_default()
                ),
            },
            FieldEdit::Delete { .. } => f.write_str(&self.key()),
        }
    }
}

/// The complete set of post-hash mutations for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutations {
    pub cross_seed: Option<CrossSeed>,
    /// Remove the automatic [`CROSS_SEED_FIELD`] the builder installs.
    pub suppress_cross_seed: bool,
    pub edits: Vec<FieldEdit>,
}

impl Mutations {
    pub fn is_empty(&self) -> bool {
        self.cross_seed.is_none() && !self.suppress_cross_seed && self.edits.is_empty()
    }
}

/// Applies `mutations` to `descriptor` in place.
///
/// Cross-seed labeling runs first, then suppression, then the edits left to
/// right. Suppression only ever removes [`CROSS_SEED_FIELD`]; a label or
/// entropy added by the same call stays.
pub fn apply(descriptor: &mut Descriptor, mutations: &Mutations) -> Result<(), MetafileError> {
    if mutations.cross_seed.is_some() || mutations.suppress_cross_seed {
        let info = descriptor
            .info_mut()
            .filter(|info| info.as_dict().is_some())
            .ok_or(MetafileError::MissingField("info"))?;

        match &mutations.cross_seed {
            Some(CrossSeed::Label(label)) => {
                info.insert(LABEL_FIELD, label.as_str());
            }
            Some(CrossSeed::Entropy) => {
                info.insert(ENTROPY_FIELD, random_entropy());
            }
            None => {}
        }

        if mutations.suppress_cross_seed {
            info.remove(CROSS_SEED_FIELD.as_bytes());
        }
    }

    for edit in &mutations.edits {
        apply_edit(descriptor.root_mut(), edit)?;
    }

    Ok(())
}

/// Applies a single edit to a root dictionary.
pub fn apply_edit(root: &mut Value, edit: &FieldEdit) -> Result<(), MetafileError> {
    let bad = |reason| MetafileError::BadAssignment {
        key: edit.key(),
        reason,
    };

    let (last, parents) = edit
        .path()
        .split_last()
        .ok_or_else(|| bad("empty key"))?;

    match edit {
        FieldEdit::Assign { value, .. } => {
            let mut namespace = root;
            for key in parents {
                namespace = namespace
                    .as_dict_mut()
                    .ok_or_else(|| bad("not a dictionary"))?
                    .entry(Bytes::copy_from_slice(key.as_bytes()))
                    .or_insert_with(Value::dict);
            }
            namespace
                .as_dict_mut()
                .ok_or_else(|| bad("not a dictionary"))?
                .insert(Bytes::copy_from_slice(last.as_bytes()), value.clone());
        }
        FieldEdit::Delete { .. } => {
            let mut namespace = root;
            for key in parents {
                let dict = namespace
                    .as_dict_mut()
                    .ok_or_else(|| bad("not a dictionary"))?;
                namespace = match dict.get_mut(key.as_bytes()) {
                    Some(next) => next,
                    None => return Ok(()),
                };
            }
            namespace
                .as_dict_mut()
                .ok_or_else(|| bad("not a dictionary"))?
                .remove(last.as_bytes());
        }
    }

    Ok(())
}

fn parse_key_path(key: &str) -> Result<Vec<String>, MetafileError> {
    let path: Vec<String> = key
        .replace("..", "\0")
        .split('.')
        .map(|k| k.replace('\0', "."))
        .collect();

    if path.iter().any(String::is_empty) {
        return Err(MetafileError::BadAssignment {
            key: key.to_string(),
            reason: "empty key",
        });
    }

    Ok(path)
}

fn infer_value(raw: &str) -> Value {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
    }
    Value::string(raw)
}

fn random_entropy() -> String {
    let mut bytes = [0u8; ENTROPY_BITS / 8];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    fn descriptor() -> Descriptor {
        Descriptor::from_bytes(
            b"d8:announce15:http://test.com4:infod4:name4:test12:x_cross_seed4:abcdee",
        )
        .unwrap()
    }

    fn edits(args: &[&str]) -> Mutations {
        Mutations {
            edits: args.iter().map(|s| s.parse().unwrap()).collect(),
            ..Mutations::default()
        }
    }

    #[test]
    fn test_parse_edits() {
        assert_eq!(
            "comment=hello".parse::<FieldEdit>().unwrap(),
            FieldEdit::Assign {
                path: vec!["comment".into()],
                value: Value::string("hello"),
            }
        );
        assert_eq!(
            "info.private=1".parse::<FieldEdit>().unwrap(),
            FieldEdit::Assign {
                path: vec!["info".into(), "private".into()],
                value: Value::Integer(1),
            }
        );
        assert_eq!(
            "info.source".parse::<FieldEdit>().unwrap(),
            FieldEdit::Delete {
                path: vec!["info".into(), "source".into()],
            }
        );
        assert_eq!(
            "a..b=x=y".parse::<FieldEdit>().unwrap(),
            FieldEdit::Assign {
                path: vec!["a.b".into()],
                value: Value::string("x=y"),
            }
        );
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!("".parse::<FieldEdit>().is_err());
        assert!("=value".parse::<FieldEdit>().is_err());
        assert!("info.=1".parse::<FieldEdit>().is_err());
    }

    #[test]
    fn test_value_inference() {
        assert_eq!(infer_value("42"), Value::Integer(42));
        assert_eq!(infer_value("-7"), Value::Integer(-7));
        assert_eq!(infer_value("+7"), Value::Integer(7));
        assert_eq!(infer_value("4a"), Value::string("4a"));
        assert_eq!(infer_value(""), Value::string(""));
        assert_eq!(infer_value("-"), Value::string("-"));
        assert_eq!(
            infer_value("99999999999999999999"),
            Value::string("99999999999999999999")
        );
    }

    #[test]
    fn test_display_roundtrips_key() {
        let edit: FieldEdit = "a..b.c=5".parse().unwrap();
        assert_eq!(edit.to_string(), "a..b.c=5");
        let edit: FieldEdit = "info.source".parse().unwrap();
        assert_eq!(edit.to_string(), "info.source");
    }

    #[test]
    fn test_assign_and_override() {
        let mut d = descriptor();
        apply(&mut d, &edits(&["comment=first", "comment=second", "info.source=XYZ"])).unwrap();

        assert_eq!(d.get(b"comment").and_then(Value::as_str), Some("second"));
        assert_eq!(
            d.info().unwrap().get(b"source").and_then(Value::as_str),
            Some("XYZ")
        );
    }

    #[test]
    fn test_assign_creates_intermediate_dicts() {
        let mut d = descriptor();
        apply(&mut d, &edits(&["rtorrent.custom.label=tv"])).unwrap();
        let custom = d.get(b"rtorrent").unwrap().get(b"custom").unwrap();
        assert_eq!(custom.get(b"label").and_then(Value::as_str), Some("tv"));
    }

    #[test]
    fn test_assign_through_scalar_fails() {
        let mut d = descriptor();
        let result = apply(&mut d, &edits(&["announce.sub=1"]));
        assert!(matches!(result, Err(MetafileError::BadAssignment { .. })));
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let original = descriptor();
        let mut d = original.clone();
        apply(&mut d, &edits(&["missing", "info.missing", "nope.deeper.still"])).unwrap();
        assert_eq!(d, original);
    }

    #[test]
    fn test_empty_mutations_are_noop() {
        let original = descriptor();
        let mut d = original.clone();
        let mutations = Mutations::default();
        assert!(mutations.is_empty());
        apply(&mut d, &mutations).unwrap();
        assert_eq!(d, original);
    }

    #[test]
    fn test_delete_existing() {
        let mut d = descriptor();
        apply(&mut d, &edits(&["announce"])).unwrap();
        assert!(d.get(b"announce").is_none());
    }

    #[test]
    fn test_cross_seed_label() {
        let mut d = descriptor();
        let before = d.info_hash().unwrap();
        let mutations = Mutations {
            cross_seed: Some(CrossSeed::from_arg("tracker-b")),
            ..Mutations::default()
        };
        apply(&mut d, &mutations).unwrap();

        let info = d.info().unwrap();
        assert_eq!(
            info.get(LABEL_FIELD.as_bytes()).and_then(Value::as_str),
            Some("tracker-b")
        );
        assert_ne!(d.info_hash().unwrap(), before);
    }

    #[test]
    fn test_cross_seed_entropy() {
        assert_eq!(CrossSeed::from_arg("@entropy"), CrossSeed::Entropy);

        let mutations = Mutations {
            cross_seed: Some(CrossSeed::Entropy),
            ..Mutations::default()
        };
        let mut a = descriptor();
        let mut b = descriptor();
        apply(&mut a, &mutations).unwrap();
        apply(&mut b, &mutations).unwrap();

        let entropy = a
            .info()
            .unwrap()
            .get(ENTROPY_FIELD.as_bytes())
            .and_then(Value::as_str)
            .unwrap();
        assert_eq!(entropy.len(), ENTROPY_BITS / 4);
        assert!(entropy.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.info_hash().unwrap(), b.info_hash().unwrap());
    }

    #[test]
    fn test_suppress_cross_seed() {
        let mut d = descriptor();
        let mutations = Mutations {
            suppress_cross_seed: true,
            ..Mutations::default()
        };
        apply(&mut d, &mutations).unwrap();
        assert!(d.info().unwrap().get(CROSS_SEED_FIELD.as_bytes()).is_none());

        // already gone: still fine
        apply(&mut d, &mutations).unwrap();
    }

    #[test]
    fn test_suppress_keeps_label() {
        let mut d = descriptor();
        let mutations = Mutations {
            cross_seed: Some(CrossSeed::Label("x".into())),
            suppress_cross_seed: true,
            edits: Vec::new(),
        };
        apply(&mut d, &mutations).unwrap();

        let info = d.info().unwrap();
        assert!(info.get(CROSS_SEED_FIELD.as_bytes()).is_none());
        assert!(info.get(LABEL_FIELD.as_bytes()).is_some());
    }

    #[test]
    fn test_edits_run_after_cross_seed() {
        let mut d = descriptor();
        let mut mutations = edits(&["info.x_cross_seed_label"]);
        mutations.cross_seed = Some(CrossSeed::Label("gone".into()));
        apply(&mut d, &mutations).unwrap();
        assert!(d.info().unwrap().get(LABEL_FIELD.as_bytes()).is_none());
    }

    #[test]
    fn test_deterministic() {
        let mutations = edits(&["info.source=ABC", "comment=c", "info.x_cross_seed"]);
        let mut a = descriptor();
        let mut b = descriptor();
        apply(&mut a, &mutations).unwrap();
        apply(&mut b, &mutations).unwrap();
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_cross_seed_without_info_fails() {
        let mut d = Descriptor::from_value(decode(b"d3:foo3:bare").unwrap()).unwrap();
        let mutations = Mutations {
            suppress_cross_seed: true,
            ..Mutations::default()
        };
        assert!(matches!(
            apply(&mut d, &mutations),
            Err(MetafileError::MissingField("info"))
        ));
    }
}
