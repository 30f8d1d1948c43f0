//! Pattern-based structural analysis.
//!
//! This is a heuristic, not a parser: each language family has a handful of
//! line-anchored regular expressions for function and class-like
//! declarations. Multi-line signatures, macros and nested declarations in
//! unusual layouts can be missed or misreported. Analysis never fails; an
//! unknown extension simply yields no declarations.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;

/// A declaration found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub name: String,
    /// 1-based line number.
    pub start_line: usize,
}

impl Declaration {
    pub fn new(name: impl Into<String>, start_line: usize) -> Self {
        Self {
            name: name.into(),
            start_line,
        }
    }
}

/// Declarations of a file, each list ordered by line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub functions: Vec<Declaration>,
    pub classes: Vec<Declaration>,
}

impl Analysis {
    /// Functions and classes together.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.functions.iter().chain(&self.classes)
    }

    /// Check if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.classes.is_empty()
    }
}

/// Language families with distinct declaration syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// JavaScript and TypeScript.
    JavaScript,
    Rust,
    Go,
    /// Java, C#, C and C++.
    CLike,
    Kotlin,
    Python,
    Ruby,
    Php,
    Swift,
}

impl Language {
    /// Detect the language family from a file extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        let language = match extension.as_str() {
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "vue" | "svelte" => {
                Self::JavaScript
            }
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" | "cs" | "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" => Self::CLike,
            "kt" | "kts" => Self::Kotlin,
            "py" | "pyi" => Self::Python,
            "rb" | "rake" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            _ => return None,
        };
        Some(language)
    }

    fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Self::Python | Self::Ruby => &["#"],
            Self::Php => &["//", "#", "/*", "*"],
            _ => &["//", "/*", "*"],
        }
    }
}

/// Words that can appear where a declaration name is expected but are not
/// declarations (`if (x) {`, `return foo(x)`, ...).
const KEYWORDS: &[&str] = &[
    "if", "else", "for", "foreach", "while", "do", "switch", "case", "catch", "try", "return",
    "new", "throw", "function", "await", "yield", "delete", "typeof", "sizeof", "using", "lock",
    "elif", "when", "match", "with", "super", "this",
];

struct Patterns {
    functions: Vec<Regex>,
    classes: Vec<Regex>,
}

impl Patterns {
    fn compile(functions: &[&str], classes: &[&str]) -> Self {
        let compile_all = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
        };
        Self {
            functions: compile_all(functions),
            classes: compile_all(classes),
        }
    }
}

static JAVASCRIPT: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)",
            r"^\s*(?:(?:public|private|protected|static|async|readonly|override|get|set)\s+)*(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\([^)]*\)\s*(?::\s*[^{]+)?\{\s*$",
        ],
        &[
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)",
            r"^\s*(?:export\s+)?interface\s+(?P<name>[A-Za-z_$][\w$]*)",
        ],
    )
});

static RUST: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[
            r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_]\w*)"#,
        ],
        &[r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|trait|union)\s+(?P<name>[A-Za-z_]\w*)"],
    )
});

static GO: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[r"^func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_]\w*)"],
        &[r"^\s*type\s+(?P<name>[A-Za-z_]\w*)\s+(?:struct|interface)\b"],
    )
});

static CLIKE: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[
            r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|synchronized|async|override|virtual|sealed|native|extern|inline|constexpr|unsafe|partial)\s+)*(?P<lead>[A-Za-z_][\w<>\[\],.?*&:]*)\s+[*&]?(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
        ],
        &[
            r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|sealed|partial|typedef)\s+)*(?:class|interface|struct|enum|record)\s+(?P<name>[A-Za-z_]\w*)",
        ],
    )
});

static KOTLIN: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[
            r"^\s*(?:(?:public|private|protected|internal|override|open|suspend|inline|operator|infix|tailrec|abstract)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(?P<name>[A-Za-z_]\w*)",
        ],
        &[
            r"^\s*(?:(?:public|private|protected|internal|abstract|open|sealed|data|enum|inner|value)\s+)*(?:class|interface|object)\s+(?P<name>[A-Za-z_]\w*)",
        ],
    )
});

static PYTHON: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)"],
        &[r"^\s*class\s+(?P<name>[A-Za-z_]\w*)"],
    )
});

static RUBY: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[r"^\s*def\s+(?:self\.)?(?P<name>[A-Za-z_]\w*[?!=]?)"],
        &[r"^\s*(?:class|module)\s+(?P<name>[A-Z]\w*)"],
    )
});

static PHP: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[
            r"^\s*(?:(?:public|private|protected|static|final|abstract)\s+)*function\s+&?(?P<name>[A-Za-z_]\w*)",
        ],
        &[
            r"^\s*(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum)\s+(?P<name>[A-Za-z_]\w*)",
        ],
    )
});

static SWIFT: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::compile(
        &[
            r"^\s*(?:(?:public|private|fileprivate|internal|open|static|class|override|final|mutating|@\w+)\s+)*func\s+(?P<name>[A-Za-z_]\w*)",
        ],
        &[
            r"^\s*(?:(?:public|private|fileprivate|internal|open|final)\s+)*(?:class|struct|enum|protocol|actor)\s+(?P<name>[A-Za-z_]\w*)",
        ],
    )
});

fn patterns(language: Language) -> &'static Patterns {
    match language {
        Language::JavaScript => &JAVASCRIPT,
        Language::Rust => &RUST,
        Language::Go => &GO,
        Language::CLike => &CLIKE,
        Language::Kotlin => &KOTLIN,
        Language::Python => &PYTHON,
        Language::Ruby => &RUBY,
        Language::Php => &PHP,
        Language::Swift => &SWIFT,
    }
}

/// Structural analyzer.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Extract function and class declarations from `text`.
    pub fn analyze(&self, text: &str, file_path: &str) -> Analysis {
        let Some(language) = Language::from_path(file_path) else {
            return Analysis::default();
        };
        let patterns = patterns(language);
        let comments = language.comment_prefixes();

        let mut end = self.config.max_bytes.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let mut analysis = Analysis::default();
        for (index, line) in text[..end].lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || comments.iter().any(|c| trimmed.starts_with(c)) {
                continue;
            }
            let line_number = index + 1;
            collect_matches(&patterns.functions, line, line_number, &mut analysis.functions);
            collect_matches(&patterns.classes, line, line_number, &mut analysis.classes);
        }

        finish(&mut analysis.functions);
        finish(&mut analysis.classes);
        analysis
    }
}

fn collect_matches(patterns: &[Regex], line: &str, line_number: usize, out: &mut Vec<Declaration>) {
    for pattern in patterns {
        let Some(captures) = pattern.captures(line) else {
            continue;
        };
        let Some(name) = captures.name("name").map(|m| m.as_str()) else {
            continue;
        };
        let lead = captures.name("lead").map(|m| m.as_str());
        if KEYWORDS.contains(&name) || lead.is_some_and(|lead| KEYWORDS.contains(&lead)) {
            continue;
        }
        out.push(Declaration::new(name, line_number));
    }
}

fn finish(declarations: &mut Vec<Declaration>) {
    let mut seen = HashSet::new();
    declarations.retain(|d| seen.insert((d.start_line, d.name.clone())));
    declarations.sort_by(|a, b| a.start_line.cmp(&b.start_line).then_with(|| a.name.cmp(&b.name)));
}

/// Analyze with the default configuration.
pub fn analyze(text: &str, file_path: &str) -> Analysis {
    Analyzer::default().analyze(text, file_path)
}
