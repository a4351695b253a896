use crate::closure::ClosureStrategy;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 1024;

/// Extra module directories, separated like `PATH`.
pub const PATH_VAR: &str = "MLISP_PATH";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub closure_strategy: ClosureStrategy,
    pub max_expansion_depth: usize,
    pub search_paths: Vec<PathBuf>,
    pub history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            closure_strategy: ClosureStrategy::default(),
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            search_paths: vec![PathBuf::from(".")],
            history: true,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Error {
    MissingValue(&'static str),
    BadNumber(String),
    UnknownFlag(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingValue(flag) => write!(f, "{} needs a value", flag),
            Error::BadNumber(s) => write!(f, "expected a positive number, got {}", s),
            Error::UnknownFlag(s) => write!(f, "unknown option {}", s),
        }
    }
}

impl std::error::Error for Error {}

/// A parsed command line: settings plus the files to run, if any.
#[derive(Debug, PartialEq)]
pub struct Invocation {
    pub config: Config,
    pub files: Vec<String>,
}

pub const USAGE: &str = "usage: mlisp [--legacy-closures] [--max-expansion N] [-I dir]... [--no-history] [FILE]...";

impl Config {
    /// Parses arguments (without the program name). Directories given with
    /// `-I` are searched first, then the current directory, then `MLISP_PATH`.
    pub fn from_args<I>(args: I) -> Result<Invocation, Error>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut includes = Vec::new();
        let mut files = Vec::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--legacy-closures" => config.closure_strategy = ClosureStrategy::Legacy,
                "--no-history" => config.history = false,
                "--max-expansion" => {
                    let value = args.next().ok_or(Error::MissingValue("--max-expansion"))?;
                    config.max_expansion_depth = match value.parse::<usize>() {
                        Ok(n) if n > 0 => n,
                        _ => return Err(Error::BadNumber(value)),
                    };
                }
                "-I" => includes.push(PathBuf::from(args.next().ok_or(Error::MissingValue("-I"))?)),
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return Err(Error::UnknownFlag(arg))
                }
                _ => files.push(arg),
            }
        }
        includes.append(&mut config.search_paths);
        config.search_paths = includes;
        Ok(Invocation {
            config: config.with_env_search_paths(),
            files,
        })
    }

    pub fn with_env_search_paths(mut self) -> Self {
        if let Some(paths) = std::env::var_os(PATH_VAR) {
            self.search_paths.extend(std::env::split_paths(&paths));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation, Error> {
        Config::from_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_without_flags() {
        let invocation = parse(&[]).unwrap();
        assert_eq!(invocation.config.closure_strategy, ClosureStrategy::Optimized);
        assert_eq!(invocation.config.max_expansion_depth, DEFAULT_MAX_EXPANSION_DEPTH);
        assert_eq!(invocation.config.search_paths[0], PathBuf::from("."));
        assert!(invocation.files.is_empty());
    }

    #[test]
    fn flags_and_files() {
        let invocation = parse(&[
            "--legacy-closures",
            "-I",
            "lib",
            "--max-expansion",
            "16",
            "--no-history",
            "main.mlisp",
        ])
        .unwrap();
        let config = invocation.config;
        assert_eq!(config.closure_strategy, ClosureStrategy::Legacy);
        assert_eq!(config.max_expansion_depth, 16);
        assert!(!config.history);
        assert_eq!(&config.search_paths[..2], &[PathBuf::from("lib"), PathBuf::from(".")]);
        assert_eq!(invocation.files, vec!["main.mlisp".to_string()]);
    }

    #[test]
    fn bad_flags_are_reported() {
        assert_eq!(parse(&["--max-expansion"]), Err(Error::MissingValue("--max-expansion")));
        assert_eq!(parse(&["--max-expansion", "0"]), Err(Error::BadNumber("0".into())));
        assert_eq!(parse(&["--fast"]), Err(Error::UnknownFlag("--fast".into())));
    }
}
