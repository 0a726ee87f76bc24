//! External PPK solver driver.
//! The solver is a black box: it is given a configuration file, a time window,
//! the rover and base RINEX files, and writes `.pos` solutions.
mod config;

pub use config::{BaseStation, ProcessingParameters, create_configuration_file, parse_excluded_sats};

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use hifitime::prelude::Epoch;
use log::{debug, trace};
use serde::Serialize;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::watch,
};

use crate::{
    error::{Error, Result},
    utils::solver_datetime,
};

/// Solution track, written by the solver
pub const TRACK_FILE: &str = "ppk_track.pos";

/// Solutions at the time events, written by the solver next to the track
pub const EVENTS_FILE: &str = "ppk_track_events.pos";

/// Solver configuration file name
pub const CONFIG_FILE: &str = "rtklib_configuration.conf";

/// Solution strategy
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolutionType {
    Forward,
    Backward,
    Combined,
}

impl std::fmt::Display for SolutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SolutionType {
    /// All strategies, in order of attempt
    pub const ALL: [Self; 3] = [Self::Forward, Self::Backward, Self::Combined];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Combined => "combined",
        }
    }

    /// Configuration line selecting this strategy
    pub fn config_line(&self) -> String {
        format!("pos1-soltype       ={}\n", self.name())
    }
}

/// One solver run
#[derive(Debug, Clone)]
pub struct SolverJob {
    /// Configuration file
    pub config: PathBuf,

    /// Output directory of this run
    pub dir: PathBuf,

    /// Rover observations
    pub rover: PathBuf,

    /// Base observations
    pub base: PathBuf,

    /// GPS navigation
    pub nav: PathBuf,

    /// Glonass navigation, only passed when Glonass is used
    pub gnav: Option<PathBuf>,

    /// Processing window
    pub start: Epoch,
    pub end: Epoch,
}

impl SolverJob {
    /// Solution track produced by this run
    pub fn track(&self) -> PathBuf {
        self.dir.join(TRACK_FILE)
    }

    /// Event solutions produced by this run
    pub fn events(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    /// Command line arguments
    pub fn args(&self) -> Vec<OsString> {
        let (start_date, start_time) = solver_datetime(self.start, false);
        let (end_date, end_time) = solver_datetime(self.end, true);

        let mut args: Vec<OsString> = vec![
            "-k".into(),
            self.config.clone().into(),
            "-o".into(),
            self.track().into(),
            "-ts".into(),
            start_date.into(),
            start_time.into(),
            "-te".into(),
            end_date.into(),
            end_time.into(),
            self.rover.clone().into(),
            self.base.clone().into(),
            self.nav.clone().into(),
        ];

        if let Some(gnav) = &self.gnav {
            args.push(gnav.clone().into());
        }

        args
    }
}

/// Resolves once the shutdown flag is raised.
/// Never resolves if the flag can no longer change.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone)]
pub struct Solver {
    /// Solver executable
    pub executable: PathBuf,
}

impl Solver {
    pub fn new(executable: &Path) -> Self {
        Self {
            executable: executable.to_path_buf(),
        }
    }

    /// Runs the solver to completion and returns the event solutions.
    /// The subprocess is killed if `shutdown` is raised meanwhile.
    pub async fn run(&self, job: &SolverJob, mut shutdown: watch::Receiver<bool>) -> Result<PathBuf> {
        trace!("{} {:?}", self.executable.display(), job.args());

        let mut child = Command::new(&self.executable)
            .args(job.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Solver(format!("{}: {}", self.executable.display(), e)))?;

        let stderr = child.stderr.take();

        let completion = async {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("processing") {
                        debug!("{} - {}", job.dir.display(), line.trim());
                    }
                }
            }
            child.wait().await
        };

        let status = tokio::select! {
            status = completion => status?,
            _ = cancelled(&mut shutdown) => {
                debug!("{} - solver interrupted", job.dir.display());
                return Err(Error::Cancelled);
            },
        };

        if !status.success() {
            return Err(Error::Solver(format!(
                "{} exited with {}",
                self.executable.display(),
                status
            )));
        }

        let events = job.events();
        if !events.exists() {
            return Err(Error::MissingSolution(events.display().to_string()));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::t;

    fn job(dir: &Path) -> SolverJob {
        SolverJob {
            config: dir.join(CONFIG_FILE),
            dir: dir.to_path_buf(),
            rover: dir.join("rover.obs"),
            base: dir.join("base.obs"),
            nav: dir.join("base.nav"),
            gnav: None,
            start: t(10, 0, 0, 100),
            end: t(10, 0, 59, 900),
        }
    }

    #[test]
    fn test_solution_types() {
        assert_eq!(SolutionType::ALL.len(), 3);
        assert_eq!(SolutionType::Combined.to_string(), "combined");
        assert_eq!(
            SolutionType::Forward.config_line(),
            "pos1-soltype       =forward\n"
        );
    }

    #[test]
    fn test_args() {
        let dir = Path::new("/tmp/run");
        let mut job = job(dir);

        let args = job
            .args()
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect::<Vec<_>>();

        assert_eq!(
            args,
            vec![
                "-k",
                "/tmp/run/rtklib_configuration.conf",
                "-o",
                "/tmp/run/ppk_track.pos",
                "-ts",
                "2020/07/22",
                "10:00:00",
                "-te",
                "2020/07/22",
                "10:01:00",
                "/tmp/run/rover.obs",
                "/tmp/run/base.obs",
                "/tmp/run/base.nav",
            ]
        );

        job.gnav = Some(dir.join("base.gnav"));
        assert_eq!(job.args().len(), 14);
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, content: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", content)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run() {
        let dir = tempfile::tempdir().unwrap();
        let solver = Solver::new(&script(
            dir.path(),
            "solver.sh",
            "echo \"processing : 10:00:00\" >&2\ntouch \"$4\" \"${4%.pos}_events.pos\"",
        ));

        let (_tx, rx) = watch::channel(false);
        let events = solver.run(&job(dir.path()), rx).await.unwrap();
        assert_eq!(events, dir.path().join(EVENTS_FILE));
        assert!(dir.path().join(TRACK_FILE).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);

        let solver = Solver::new(&script(dir.path(), "exit.sh", "exit 3"));
        assert!(matches!(
            solver.run(&job(dir.path()), rx.clone()).await,
            Err(Error::Solver(_))
        ));

        let solver = Solver::new(&script(dir.path(), "track.sh", "touch \"$4\""));
        assert!(matches!(
            solver.run(&job(dir.path()), rx.clone()).await,
            Err(Error::MissingSolution(_))
        ));

        let solver = Solver::new(&dir.path().join("missing"));
        assert!(matches!(
            solver.run(&job(dir.path()), rx).await,
            Err(Error::Solver(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let solver = Solver::new(&script(dir.path(), "sleep.sh", "sleep 30"));

        let (tx, rx) = watch::channel(false);
        let job = job(dir.path());

        let run = tokio::spawn(async move { solver.run(&job, rx).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
