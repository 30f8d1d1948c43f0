//! Result classification.
//!
//! A best-effort heuristic over the file path, a few content cues and the
//! file's rank. Rules are tried in order:
//!
//! 1. final score below the unrelated threshold: `unrelated`
//! 2. configuration file by name or extension: `config`
//! 3. entry-point naming, directory or content cue: `entry-point`
//! 4. among the top results and above the core threshold: `core-logic`
//! 5. utility-style directory or name: `helper`
//! 6. otherwise `core-logic` above the core threshold, else `helper`

use std::path::Path;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RankerConfig;

/// Role of a file in relation to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    EntryPoint,
    CoreLogic,
    Helper,
    Config,
    Unrelated,
}

impl Classification {
    /// Get a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryPoint => "entry-point",
            Self::CoreLogic => "core-logic",
            Self::Helper => "helper",
            Self::Config => "config",
            Self::Unrelated => "unrelated",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "properties", "plist",
];

const CONFIG_NAMES: &[&str] = &[
    "dockerfile",
    "makefile",
    "cargo.lock",
    "package-lock.json",
    ".env",
    ".gitignore",
    ".editorconfig",
];

const ENTRY_STEMS: &[&str] = &[
    "main", "index", "app", "server", "cli", "routes", "router", "handler", "handlers",
    "controller", "controllers", "api", "endpoints",
];

const ENTRY_DIRS: &[&str] = &[
    "routes",
    "controllers",
    "handlers",
    "pages",
    "endpoints",
    "cmd",
    "bin",
    "api",
];

const HELPER_DIRS: &[&str] = &[
    "util", "utils", "helper", "helpers", "common", "shared", "support", "lib",
];

static ENTRY_CUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"\.(?:get|post|put|patch|delete|route)\s*\(\s*['"`]/"#,
        r"@(?:Get|Post|Put|Patch|Delete|RequestMapping|GetMapping|PostMapping|app\.route|router\.)",
        r"\bfn\s+main\s*\(",
        r"\bfunc\s+main\s*\(",
        r#"if\s+__name__\s*==\s*['"]__main__['"]"#,
        r"\bpublic\s+static\s+void\s+main\s*\(",
        r"addEventListener\s*\(",
        r"\bcreateServer\s*\(",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or(path)
        .to_ascii_lowercase()
}

fn directories(path: &str) -> impl Iterator<Item = String> + '_ {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts.into_iter().map(str::to_ascii_lowercase)
}

/// Whether the path names a configuration file.
pub fn is_config_file(path: &str) -> bool {
    let name = file_name(path);
    if CONFIG_NAMES.contains(&name.as_str()) || name.starts_with(".env") {
        return true;
    }
    if name.contains("config") || name.contains("settings") {
        return true;
    }
    Path::new(&name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|e| CONFIG_EXTENSIONS.contains(&e))
}

/// Whether the path or content suggests an externally reachable entry.
pub fn is_entry_point(path: &str, content: &str) -> bool {
    let name = file_name(path);
    let stem = name.split('.').next().unwrap_or_default();
    if ENTRY_STEMS.contains(&stem) {
        return true;
    }
    if directories(path).any(|d| ENTRY_DIRS.contains(&d.as_str())) {
        return true;
    }
    ENTRY_CUES.iter().any(|re| re.is_match(content))
}

/// Whether the path looks like a utility module.
pub fn is_helper_path(path: &str) -> bool {
    let name = file_name(path);
    let stem = name.split('.').next().unwrap_or_default();
    stem.contains("util")
        || stem.contains("helper")
        || directories(path).any(|d| HELPER_DIRS.contains(&d.as_str()))
}

/// Classify one ranked file. `rank` is the 0-based position after sorting.
pub fn classify(
    path: &str,
    content: &str,
    final_score: f32,
    rank: usize,
    config: &RankerConfig,
) -> Classification {
    if final_score < config.unrelated_threshold {
        return Classification::Unrelated;
    }
    if is_config_file(path) {
        return Classification::Config;
    }
    if is_entry_point(path, content) {
        return Classification::EntryPoint;
    }
    if rank < config.core_logic_top_n && final_score >= config.core_logic_threshold {
        return Classification::CoreLogic;
    }
    if is_helper_path(path) {
        return Classification::Helper;
    }
    if final_score >= config.core_logic_threshold {
        Classification::CoreLogic
    } else {
        Classification::Helper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn class_of(path: &str, content: &str, score: f32, rank: usize) -> Classification {
        classify(path, content, score, rank, &RankerConfig::default())
    }

    #[test]
    fn test_low_score_is_unrelated() {
        assert_eq!(class_of("src/main.rs", "", 0.01, 0), Classification::Unrelated);
    }

    #[test]
    fn test_config_files() {
        assert_eq!(class_of("tsconfig.json", "", 0.5, 0), Classification::Config);
        assert_eq!(class_of("deploy/Dockerfile", "", 0.5, 0), Classification::Config);
        assert_eq!(class_of("src/settings.py", "", 0.5, 0), Classification::Config);
        assert_eq!(class_of(".env.local", "", 0.5, 0), Classification::Config);
    }

    #[test]
    fn test_entry_points() {
        assert_eq!(class_of("src/routes/auth.ts", "", 0.5, 5), Classification::EntryPoint);
        assert_eq!(class_of("src/index.ts", "", 0.5, 5), Classification::EntryPoint);
        assert_eq!(
            class_of("src/auth.ts", "router.post('/login', handler)", 0.5, 5),
            Classification::EntryPoint
        );
        assert_eq!(
            class_of("tool.py", "if __name__ == \"__main__\":\n    run()", 0.5, 5),
            Classification::EntryPoint
        );
    }

    #[test]
    fn test_core_logic_and_helpers() {
        assert_eq!(class_of("src/auth/session.ts", "", 0.6, 0), Classification::CoreLogic);
        assert_eq!(class_of("src/utils/strings.ts", "", 0.6, 5), Classification::Helper);
        assert_eq!(class_of("src/auth/token.ts", "", 0.6, 7), Classification::CoreLogic);
        assert_eq!(class_of("src/auth/token.ts", "", 0.2, 1), Classification::Helper);
    }

    #[test]
    fn test_serialized_form() {
        assert_eq!(
            serde_json::to_string(&Classification::EntryPoint).unwrap(),
            "\"entry-point\""
        );
        assert_eq!(Classification::CoreLogic.to_string(), "core-logic");
    }
}
