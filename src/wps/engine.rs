use crate::{
    config::Config,
    error::{RavenError, Result},
};
use log::{debug, info};
use std::{
    path::{Path, PathBuf},
    process::Command,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program {
    Raven,
    Ostrich,
}

/// one invocation of the modelling engine inside a prepared run directory
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    pub program: Program,
    pub dir: PathBuf,
    /// file stem of the `.rvi`, `.rvp`, ... configuration
    pub model: String,
    /// prefix Raven puts on every output file
    pub run_name: String,
}

impl Job {
    /// where Raven writes its outputs for this job
    pub fn output_dir(&self) -> PathBuf {
        match self.program {
            Program::Raven => self.dir.join("output"),
            Program::Ostrich => self.dir.join("best"),
        }
    }

    pub fn output(&self, suffix: &str) -> PathBuf {
        self.output_dir()
            .join(format!("{}_{}", self.run_name, suffix))
    }
}

/// the external simulation and calibration executables
pub trait Engine {
    fn run(&self, job: &Job) -> Result<()>;
}

/// spawns the configured `raven` and `ostrich` binaries
pub struct CommandEngine {
    raven: PathBuf,
    ostrich: PathBuf,
}

impl CommandEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            raven: config.raven_binary.clone(),
            ostrich: config.ostrich_binary.clone(),
        }
    }

    fn command(&self, job: &Job) -> Command {
        let mut cmd = match job.program {
            Program::Raven => {
                let mut cmd = Command::new(&self.raven);
                cmd.arg(&job.model).arg("-o").arg(job.output_dir());
                cmd
            }
            // ostrich reads ostIn.txt from its working directory
            Program::Ostrich => Command::new(&self.ostrich),
        };
        cmd.current_dir(&job.dir);
        cmd
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines = text.lines().collect::<Vec<&str>>();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

impl Engine for CommandEngine {
    fn run(&self, job: &Job) -> Result<()> {
        std::fs::create_dir_all(job.output_dir())?;
        let mut cmd = self.command(job);
        debug!("executing {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            RavenError::Engine(format!("cannot start {:?}: {}", cmd.get_program(), e))
        })?;
        info!(
            "{:?} completed with status {}",
            cmd.get_program(),
            output.status
        );
        if !output.status.success() {
            return Err(RavenError::Engine(format!(
                "{:?} exited with {}: {}",
                cmd.get_program(),
                output.status,
                tail(&output.stderr)
            )));
        }
        Ok(())
    }
}

/// fails with an engine error when a required artifact was not produced
pub fn expect_artifact(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(RavenError::Engine(format!(
            "engine did not produce {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn job(program: Program) -> Job {
        Job {
            program,
            dir: PathBuf::from("/runs/salmon"),
            model: "raven-gr4j-cemaneige".into(),
            run_name: "test".into(),
        }
    }

    #[test]
    fn output_locations() {
        assert_eq!(
            job(Program::Raven).output("Diagnostics.csv"),
            PathBuf::from("/runs/salmon/output/test_Diagnostics.csv")
        );
        assert_eq!(
            job(Program::Ostrich).output_dir(),
            PathBuf::from("/runs/salmon/best")
        );
    }

    #[test]
    fn raven_arguments() {
        let engine = CommandEngine::new(&Config::default());
        let cmd = engine.command(&job(Program::Raven));
        let args = cmd.get_args().collect::<Vec<_>>();
        assert_eq!(args[0], "raven-gr4j-cemaneige");
        assert_eq!(args[1], "-o");
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/runs/salmon")));
    }

    #[test]
    fn missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CommandEngine {
            raven: dir.path().join("no-such-raven"),
            ostrich: dir.path().join("no-such-ostrich"),
        };
        let job = Job {
            dir: dir.path().to_path_buf(),
            ..job(Program::Raven)
        };
        assert!(matches!(engine.run(&job), Err(RavenError::Engine(_))));
    }

    #[test]
    fn stderr_tail() {
        assert_eq!(tail(b"1\n2\n3\n4\n5\n6\n7"), "3\n4\n5\n6\n7");
        assert_eq!(tail(b""), "");
    }

    #[test]
    fn artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_Diagnostics.csv");
        assert!(matches!(expect_artifact(&path), Err(RavenError::Engine(_))));
        std::fs::write(&path, "").unwrap();
        assert_eq!(expect_artifact(&path).unwrap(), path);
    }
}
