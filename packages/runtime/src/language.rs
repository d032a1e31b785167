// ABOUTME: Closed table of supported script languages and their interpreters
// ABOUTME: Maps tags and file extensions to an interpreter binary plus fixed arguments

use plinth_config::{InterpreterSettings, RuntimeSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Php,
    Node,
    Python,
    Bash,
    Lua,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Php,
        Language::Node,
        Language::Python,
        Language::Bash,
        Language::Lua,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "php" => Some(Language::Php),
            "node" | "nodejs" | "javascript" => Some(Language::Node),
            "python" | "python3" => Some(Language::Python),
            "bash" | "sh" | "shell" => Some(Language::Bash),
            "lua" => Some(Language::Lua),
            _ => None,
        }
    }

    /// Script language for a file extension; `.js` is deliberately served as a static asset
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "php" => Some(Language::Php),
            "cjs" | "mjs" => Some(Language::Node),
            "py" => Some(Language::Python),
            "sh" => Some(Language::Bash),
            "lua" => Some(Language::Lua),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Language::Php => "php",
            Language::Node => "node",
            Language::Python => "python",
            Language::Bash => "bash",
            Language::Lua => "lua",
        }
    }

    pub fn default_binary(&self) -> &'static str {
        match self {
            Language::Php => "php-cgi",
            Language::Node => "node",
            Language::Python => "python3",
            Language::Bash => "bash",
            Language::Lua => "lua",
        }
    }

    /// Arguments placed before the script path
    pub fn fixed_args(&self) -> &'static [&'static str] {
        match self {
            // php-cgi locates the script through SCRIPT_FILENAME
            Language::Php => &[],
            Language::Node => &[],
            Language::Python => &["-B", "-u"],
            Language::Bash => &["--noprofile", "--norc"],
            Language::Lua => &[],
        }
    }

    /// Whether the script path is passed as an argument
    pub fn script_as_arg(&self) -> bool {
        !matches!(self, Language::Php)
    }

    /// Whether the interpreter speaks the CGI protocol and needs its fields
    pub fn is_cgi(&self) -> bool {
        matches!(self, Language::Php)
    }

    pub fn settings<'a>(&self, runtimes: &'a RuntimeSettings) -> &'a InterpreterSettings {
        match self {
            Language::Php => &runtimes.php,
            Language::Node => &runtimes.node,
            Language::Python => &runtimes.python,
            Language::Bash => &runtimes.bash,
            Language::Lua => &runtimes.lua,
        }
    }

    /// Configured binary, falling back to the standard interpreter name
    pub fn binary(&self, runtimes: &RuntimeSettings) -> String {
        self.settings(runtimes)
            .binary
            .clone()
            .unwrap_or_else(|| self.default_binary().to_string())
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
