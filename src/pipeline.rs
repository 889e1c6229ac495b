//! From command-line arguments to written (and optionally deployed) metafiles.
//!
//! A run is split into a pure planning step and the stages that touch the
//! filesystem or the client:
//!
//! - [`Input::classify`] decides between a magnet link and a build.
//! - [`plan`] resolves tracker aliases, checks the configuration and
//!   validates the build options. All usage errors surface here, before
//!   anything is read or written.
//! - [`make_magnet_meta`] or [`create_metafile`] write the output. With
//!   several trackers, one metafile is hashed and written per tracker.
//! - [`deploy_created`] hands the last written file to rTorrent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{Config, Tracker};
use crate::deploy::{self, Action, DeploymentTarget, Outcome};
use crate::error::Error;
use crate::metafile::{
    add_fast_resume, fields, insert_before_suffix, is_magnet, resolve_output_path, resume_path,
    BuildRequest, InfoHash, MagnetLink, Mutations,
};
use crate::progress::Progress;
use crate::rpc::{ClientRpc, XmlRpcClient};

/// What the positional arguments ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A single magnet link.
    Magnet(String),
    /// A data path and one or more tracker URLs or aliases.
    Build {
        datapath: PathBuf,
        trackers: Vec<String>,
    },
}

impl Input {
    /// Classifies the positional arguments.
    ///
    /// A magnet link is only recognized when it is the sole argument.
    pub fn classify<S: AsRef<str>>(args: &[S]) -> Result<Self, Error> {
        match args {
            [] => Err(Error::usage(
                "expected a data path and at least one tracker, or a magnet link",
            )),
            [only] if is_magnet(only.as_ref()) => Ok(Input::Magnet(only.as_ref().to_string())),
            [_] => Err(Error::usage("at least one tracker URL or alias is required")),
            [datapath, trackers @ ..] => Ok(Input::Build {
                datapath: PathBuf::from(datapath.as_ref()),
                trackers: trackers.iter().map(|t| t.as_ref().to_string()).collect(),
            }),
        }
    }
}

/// Build switches taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub private: bool,
    pub creation_date: bool,
    pub output: Option<PathBuf>,
    pub root_name: Option<String>,
    pub exclude: Vec<String>,
    pub comment: Option<String>,
    pub piece_min: Option<u64>,
    pub piece_max: Option<u64>,
    pub mutations: Mutations,
    pub fast_resume: bool,
    pub deploy: Option<Action>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            private: false,
            creation_date: true,
            output: None,
            root_name: None,
            exclude: Vec::new(),
            comment: None,
            piece_min: None,
            piece_max: None,
            mutations: Mutations::default(),
            fast_resume: false,
            deploy: None,
        }
    }
}

/// A validated run, ready to execute.
#[derive(Debug)]
pub enum Plan {
    Magnet { link: MagnetLink, watch: PathBuf },
    Build(BuildPlan),
}

/// One metafile to hash and write.
#[derive(Debug)]
pub struct BuildTarget {
    pub alias: String,
    pub request: BuildRequest,
    pub output: PathBuf,
}

#[derive(Debug)]
pub struct BuildPlan {
    /// One target per tracker argument, in command-line order.
    pub targets: Vec<BuildTarget>,
    pub mutations: Mutations,
    pub fast_resume: bool,
    pub deploy: Option<DeployPlan>,
}

#[derive(Debug)]
pub struct DeployPlan {
    pub action: Action,
    pub client: XmlRpcClient,
    pub settle: Duration,
}

/// Validates `input` and `options` against `config` without touching the data.
pub fn plan(input: Input, options: Options, config: &Config) -> Result<Plan, Error> {
    let (datapath, trackers) = match input {
        Input::Magnet(uri) => {
            let watch = config.magnet_watch().ok_or_else(|| {
                Error::usage("the magnet_watch option must be set to handle magnet links")
            })?;
            return Ok(Plan::Magnet {
                link: MagnetLink::parse(&uri),
                watch,
            });
        }
        Input::Build { datapath, trackers } => (datapath, trackers),
    };

    let trackers = config.resolve_trackers(&trackers)?;
    if trackers.is_empty() {
        return Err(Error::usage("at least one tracker URL or alias is required"));
    }

    let deploy = match options.deploy {
        Some(action) => {
            let url = config.client.url.as_deref().ok_or_else(|| {
                Error::usage("--load and --start need client.url in the configuration")
            })?;
            let client = XmlRpcClient::new(url)
                .map_err(|e| Error::usage(format!("client.url: {e}")))?;
            Some(DeployPlan {
                action,
                client,
                settle: config.settle(),
            })
        }
        None => None,
    };

    let output = resolve_output_path(&datapath, options.output.as_deref());
    let per_tracker = trackers.len() > 1;
    let mut seen = HashSet::new();

    let mut targets = Vec::with_capacity(trackers.len());
    for tracker in trackers {
        let request = build_request(&datapath, &tracker, &options, config);
        request.validate()?;

        let alias = unique_alias(&tracker.alias, &mut seen);
        let output = if per_tracker {
            insert_before_suffix(&output, &format!("-{alias}"))
        } else {
            output.clone()
        };
        debug!(output = %output.display(), tracker = %alias, "planned metafile");

        targets.push(BuildTarget {
            alias,
            request,
            output,
        });
    }

    Ok(Plan::Build(BuildPlan {
        targets,
        mutations: options.mutations,
        fast_resume: options.fast_resume,
        deploy,
    }))
}

fn build_request(
    datapath: &Path,
    tracker: &Tracker,
    options: &Options,
    config: &Config,
) -> BuildRequest {
    let mut request = BuildRequest::new(datapath, tracker.urls.clone())
        .private(options.private)
        .creation_date(options.creation_date)
        .created_by(config.created_by());
    if let Some(name) = &options.root_name {
        request = request.root_name(name.as_str());
    }
    if let Some(comment) = &options.comment {
        request = request.comment(comment.as_str());
    }
    for pattern in &options.exclude {
        request = request.exclude(pattern.as_str());
    }
    if let Some(min) = options.piece_min {
        request = request.piece_min(min);
    }
    if let Some(max) = options.piece_max {
        request = request.piece_max(max);
    }
    request
}

/// Disambiguates aliases that map to the same name, e.g. two hosts under `example`.
fn unique_alias(alias: &str, seen: &mut HashSet<String>) -> String {
    let mut candidate = alias.to_string();
    let mut n = 2;
    while !seen.insert(candidate.clone()) {
        candidate = format!("{alias}-{n}");
        n += 1;
    }
    candidate
}

/// Writes the metafile for a magnet link into the watch directory.
pub fn make_magnet_meta(link: &MagnetLink, watch: &Path) -> Result<PathBuf, Error> {
    Ok(link.write_to_watch(watch)?)
}

/// Files written for one tracker by [`create_metafile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub metafile: PathBuf,
    pub resume: Option<PathBuf>,
    pub info_hash: InfoHash,
}

impl Created {
    /// The file to hand to the client: the fast-resume variant if one was written.
    pub fn tied_file(&self) -> &Path {
        self.resume.as_deref().unwrap_or(&self.metafile)
    }
}

/// Hashes, edits and writes one metafile per target, each followed by its
/// fast-resume variant if requested.
///
/// Targets are processed in order; files written before a failure are left
/// in place.
pub fn create_metafile(
    plan: &BuildPlan,
    progress: &mut dyn Progress,
) -> Result<Vec<Created>, Error> {
    plan.targets
        .iter()
        .map(|target| create_one(plan, target, progress))
        .collect()
}

fn create_one(
    plan: &BuildPlan,
    target: &BuildTarget,
    progress: &mut dyn Progress,
) -> Result<Created, Error> {
    info!(
        path = %target.output.display(),
        tracker = %target.alias,
        "creating metafile"
    );
    let mut descriptor = target.request.build(progress)?;
    fields::apply(&mut descriptor, &plan.mutations)?;

    let info_hash = descriptor.info_hash()?;
    descriptor.write_to(&target.output)?;
    info!(path = %target.output.display(), %info_hash, "metafile written");

    let resume = if plan.fast_resume {
        let hashed = add_fast_resume(&descriptor, target.request.datapath())?;
        let path = resume_path(&target.output);
        hashed.write_to(&path)?;
        info!(path = %path.display(), "fast-resume metafile written");
        Some(path)
    } else {
        None
    };

    Ok(Created {
        metafile: target.output.clone(),
        resume,
        info_hash,
    })
}

/// Loads or starts the written metafile in the client.
pub async fn deploy_created<C: ClientRpc>(
    client: &mut C,
    created: &Created,
    action: Action,
    settle: Duration,
) -> Result<Outcome, Error> {
    let target = DeploymentTarget::new(created.tied_file(), created.info_hash, action)?;
    Ok(deploy::deploy(client, &target, settle).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metafile::CrossSeed;

    const TRACKER: &str = "http://tracker.example.com/announce";

    #[test]
    fn test_classify_magnet() {
        let uri = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";
        assert_eq!(Input::classify(&[uri]).unwrap(), Input::Magnet(uri.into()));
    }

    #[test]
    fn test_classify_build() {
        let input = Input::classify(&["data", TRACKER, "alias"]).unwrap();
        assert_eq!(
            input,
            Input::Build {
                datapath: PathBuf::from("data"),
                trackers: vec![TRACKER.into(), "alias".into()],
            }
        );
    }

    #[test]
    fn test_classify_magnet_with_tracker_is_build() {
        let uri = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";
        assert!(matches!(
            Input::classify(&[uri, TRACKER]).unwrap(),
            Input::Build { .. }
        ));
    }

    #[test]
    fn test_classify_usage_errors() {
        assert!(Input::classify::<&str>(&[]).unwrap_err().is_usage());
        assert!(Input::classify(&["data"]).unwrap_err().is_usage());
    }

    #[test]
    fn test_magnet_needs_watch_dir() {
        let input = Input::Magnet("magnet:?xt=urn:btih:ABCDEF".into());
        let err = plan(input, Options::default(), &Config::default()).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_unknown_alias_is_usage_error() {
        let input = Input::classify(&["data", "nope"]).unwrap();
        let err = plan(input, Options::default(), &Config::default()).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_deploy_needs_client_url() {
        let input = Input::classify(&["data", TRACKER]).unwrap();
        let options = Options {
            deploy: Some(Action::Start),
            ..Default::default()
        };
        let err = plan(input, options, &Config::default()).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_bad_client_url_is_usage_error() {
        let mut config = Config::default();
        config.client.url = Some("ftp://nowhere".into());
        let input = Input::classify(&["data", TRACKER]).unwrap();
        let options = Options {
            deploy: Some(Action::Load),
            ..Default::default()
        };
        assert!(plan(input, options, &config).unwrap_err().is_usage());
    }

    #[test]
    fn test_plan_build() {
        let mut config = Config::default();
        config.client.url = Some("scgi://127.0.0.1:5000".into());
        let input = Input::classify(&["/data/show/", TRACKER]).unwrap();
        let options = Options {
            deploy: Some(Action::Load),
            mutations: Mutations {
                cross_seed: Some(CrossSeed::Label("x".into())),
                ..Default::default()
            },
            ..Default::default()
        };

        match plan(input, options, &config).unwrap() {
            Plan::Build(plan) => {
                assert_eq!(plan.targets.len(), 1);
                assert_eq!(plan.targets[0].output, PathBuf::from("/data/show.torrent"));
                assert_eq!(plan.targets[0].request.trackers(), [TRACKER]);
                assert!(plan.mutations.cross_seed.is_some());
                let deploy = plan.deploy.unwrap();
                assert_eq!(deploy.action, Action::Load);
                assert_eq!(deploy.settle, config.settle());
            }
            other => panic!("expected a build plan, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_one_target_per_tracker() {
        let config = Config::from_toml(
            r#"
            [announce]
            pub = ["http://a.example.net/announce", "udp://b.example.net:6969"]
            "#,
        )
        .unwrap();
        let input = Input::classify(&[
            "/data/show",
            "http://one.example.com/announce",
            "pub",
            "http://two.example.org/announce",
        ])
        .unwrap();

        let Plan::Build(plan) = plan(input, Options::default(), &config).unwrap() else {
            panic!("expected a build plan");
        };

        let outputs: Vec<_> = plan.targets.iter().map(|t| t.output.clone()).collect();
        assert_eq!(
            outputs,
            [
                PathBuf::from("/data/show-example.torrent"),
                PathBuf::from("/data/show-pub.torrent"),
                PathBuf::from("/data/show-example-2.torrent"),
            ]
        );
        assert_eq!(plan.targets[0].request.trackers(), ["http://one.example.com/announce"]);
        assert_eq!(plan.targets[1].request.trackers().len(), 2);
    }

    #[test]
    fn test_build_options_validated_in_plan() {
        let input = Input::classify(&["/nonexistent/data", TRACKER]).unwrap();
        let options = Options {
            piece_min: Some(1 << 22),
            piece_max: Some(1 << 16),
            ..Default::default()
        };
        assert!(plan(input, options, &Config::default()).unwrap_err().is_usage());

        let input = Input::classify(&["/nonexistent/data", TRACKER]).unwrap();
        let options = Options {
            exclude: vec!["[unclosed".into()],
            ..Default::default()
        };
        assert!(plan(input, options, &Config::default()).unwrap_err().is_usage());
    }

    #[test]
    fn test_unique_alias() {
        let mut seen = HashSet::new();
        assert_eq!(unique_alias("example", &mut seen), "example");
        assert_eq!(unique_alias("example", &mut seen), "example-2");
        assert_eq!(unique_alias("example", &mut seen), "example-3");
        assert_eq!(unique_alias("other", &mut seen), "other");
    }

    #[test]
    fn test_tied_file_prefers_resume() {
        let hash = InfoHash::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        let mut created = Created {
            metafile: PathBuf::from("a.torrent"),
            resume: None,
            info_hash: hash,
        };
        assert_eq!(created.tied_file(), Path::new("a.torrent"));
        created.resume = Some(PathBuf::from("a-resume.torrent"));
        assert_eq!(created.tied_file(), Path::new("a-resume.torrent"));
    }
}
