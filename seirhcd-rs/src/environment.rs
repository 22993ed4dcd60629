use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use serde_json::Value;

use crate::{
    config::EnsembleConfig,
    error::{SeirhcdError, SeirhcdResult},
};

pub struct RunEnvironment {
    pub config: EnsembleConfig,
    pub replicate: u64,
    output: Value,
}

impl RunEnvironment {
    /// `seed` and `replicate` are lifted out of `input`; the rest of `input`
    /// deserializes into an [`EnsembleConfig`].
    pub fn from_json(data: Value) -> SeirhcdResult<Self> {
        let mut input_json = data
            .get("input")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let seed = input_json.remove("seed").and_then(|v| v.as_u64());

        let replicate = input_json
            .remove("replicate")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let mut config: EnsembleConfig = serde_json::from_value(Value::Object(input_json))?;
        if let Some(seed) = seed {
            config.seed = seed;
        }
        config.validate()?;

        let output = data.get("output").cloned().unwrap_or(Value::Null);

        Ok(Self {
            config,
            replicate,
            output,
        })
    }

    pub fn from_stdin() -> SeirhcdResult<Self> {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Err(SeirhcdError::Config("no input on stdin".to_string()));
        }
        let data: Value = serde_json::from_str(&raw)?;
        Self::from_json(data)
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        let output = &self.output;

        if output.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return output.get("dir").and_then(|v| v.as_str()).map(PathBuf::from);
        }

        // Profiled output: prefer "default", else the first profile.
        let profiles = output.get("profile").and_then(|v| v.as_object())?;
        let profile = profiles
            .get("default")
            .or_else(|| profiles.values().next())?;
        if profile.get("spec").and_then(|v| v.as_str()) == Some("filesystem") {
            return profile.get("dir").and_then(|v| v.as_str()).map(PathBuf::from);
        }

        None
    }

    /// Write a CSV table to `<output dir>/<filename>`, or to stdout when no
    /// filesystem output is configured.
    pub fn write_csv(&self, filename: &str, headers: &[&str], rows: &[Vec<String>]) -> SeirhcdResult<()> {
        match self.output_dir() {
            Some(dir) => {
                fs::create_dir_all(&dir)?;
                let file = fs::File::create(dir.join(filename))?;
                write_records(file, headers, rows)
            }
            None => write_records(io::stdout(), headers, rows),
        }
    }
}

fn write_records<W: Write>(writer: W, headers: &[&str], rows: &[Vec<String>]) -> SeirhcdResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_basic() {
        let data = json!({
            "input": {
                "seed": 42,
                "replicate": 1,
                "n_runs": 50,
                "features": { "death_reactive_rt": false }
            },
            "output": {
                "spec": "filesystem",
                "dir": "/tmp/output"
            }
        });
        let env = RunEnvironment::from_json(data).unwrap();
        assert_eq!(env.config.seed, 42);
        assert_eq!(env.replicate, 1);
        assert_eq!(env.config.n_runs, 50);
        assert!(!env.config.features.death_reactive_rt);
        assert!(env.config.features.icu_overwhelm);
        assert_eq!(env.output_dir(), Some(PathBuf::from("/tmp/output")));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let data = json!({ "input": { "n_runs": 0 } });
        assert!(matches!(
            RunEnvironment::from_json(data),
            Err(SeirhcdError::Config(_))
        ));
    }

    #[test]
    fn test_unparseable_input() {
        let data = json!({ "input": { "n_runs": "many" } });
        assert!(matches!(
            RunEnvironment::from_json(data),
            Err(SeirhcdError::Json(_))
        ));
    }

    #[test]
    fn test_output_dir_profiled() {
        let data = json!({
            "input": {},
            "output": {
                "profile": {
                    "default": {
                        "spec": "filesystem",
                        "dir": "/tmp/profiled"
                    }
                }
            }
        });
        let env = RunEnvironment::from_json(data).unwrap();
        assert_eq!(env.output_dir(), Some(PathBuf::from("/tmp/profiled")));
    }

    #[test]
    fn test_output_dir_none() {
        let data = json!({
            "input": {},
            "output": {
                "spec": "stdout"
            }
        });
        let env = RunEnvironment::from_json(data).unwrap();
        assert_eq!(env.output_dir(), None);
    }

    #[test]
    fn test_defaults() {
        let env = RunEnvironment::from_json(json!({})).unwrap();
        assert_eq!(env.config.seed, 0);
        assert_eq!(env.replicate, 0);
        assert_eq!(env.config.n_runs, EnsembleConfig::default().n_runs);
        assert_eq!(env.output_dir(), None);
    }

    #[test]
    fn test_write_csv_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data = json!({
            "output": { "spec": "filesystem", "dir": dir.path().join("out") }
        });
        let env = RunEnvironment::from_json(data).unwrap();
        env.write_csv(
            "table.csv",
            &["day", "value"],
            &[vec!["0".to_string(), "0.5".to_string()]],
        )
        .unwrap();
        let written = fs::read_to_string(dir.path().join("out").join("table.csv")).unwrap();
        assert_eq!(written, "day,value\n0,0.5\n");
    }
}
