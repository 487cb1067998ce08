//! Built-in descriptor schema
//!
//! Validation is structural: known element names under each parent, known
//! attributes per element, and well-formed boolean/enum attribute values.
//! Values that need the filesystem (paths, globs) are checked later by the
//! resolver.

use std::fmt;

use super::{DescriptorError, Element};

/// Root element name.
pub const ROOT: &str = "PapyrusProject";

/// Attribute value kinds checked by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Bool,
    Compression,
}

struct ElementRule {
    name: &'static str,
    attributes: &'static [(&'static str, Kind)],
    required: &'static [&'static str],
    children: &'static [&'static str],
}

const INCLUDE_ATTRS: &[(&str, Kind)] =
    &[("NoRecurse", Kind::Bool), ("Path", Kind::Text), ("RewriteToPath", Kind::Bool)];
const MATCH_ATTRS: &[(&str, Kind)] = &[
    ("In", Kind::Text),
    ("Exclude", Kind::Text),
    ("NoRecurse", Kind::Bool),
    ("Path", Kind::Text),
    ("RewriteToPath", Kind::Bool),
];
const EVENT_ATTRS: &[(&str, Kind)] = &[("Description", Kind::Text), ("UseInBuild", Kind::Bool)];

/// Names of the build/import event elements.
pub const EVENT_ELEMENTS: [&str; 4] =
    ["PreBuildEvent", "PostBuildEvent", "PreImportEvent", "PostImportEvent"];

const RULES: &[ElementRule] = &[
    ElementRule {
        name: ROOT,
        attributes: &[
            ("Game", Kind::Text),
            ("Flags", Kind::Text),
            ("Output", Kind::Text),
            ("Optimize", Kind::Bool),
            ("Release", Kind::Bool),
            ("Final", Kind::Bool),
            ("Anonymize", Kind::Bool),
            ("Package", Kind::Bool),
            ("Zip", Kind::Bool),
        ],
        required: &[],
        children: &[
            "Variables",
            "Imports",
            "Folders",
            "Scripts",
            "Packages",
            "ZipFiles",
            "PreBuildEvent",
            "PostBuildEvent",
            "PreImportEvent",
            "PostImportEvent",
        ],
    },
    ElementRule { name: "Variables", attributes: &[], required: &[], children: &["Variable"] },
    ElementRule {
        name: "Variable",
        attributes: &[("Name", Kind::Text), ("Value", Kind::Text)],
        required: &["Name", "Value"],
        children: &[],
    },
    ElementRule { name: "Imports", attributes: &[], required: &[], children: &["Import"] },
    ElementRule { name: "Import", attributes: &[], required: &[], children: &[] },
    ElementRule { name: "Folders", attributes: &[], required: &[], children: &["Folder"] },
    ElementRule {
        name: "Folder",
        attributes: &[("NoRecurse", Kind::Bool)],
        required: &[],
        children: &[],
    },
    ElementRule { name: "Scripts", attributes: &[], required: &[], children: &["Script"] },
    ElementRule { name: "Script", attributes: &[], required: &[], children: &[] },
    ElementRule {
        name: "Packages",
        attributes: &[("Output", Kind::Text)],
        required: &[],
        children: &["Package"],
    },
    ElementRule {
        name: "Package",
        attributes: &[("Name", Kind::Text), ("RootDir", Kind::Text)],
        required: &[],
        children: &["Include", "Match"],
    },
    ElementRule {
        name: "ZipFiles",
        attributes: &[("Output", Kind::Text)],
        required: &[],
        children: &["ZipFile"],
    },
    ElementRule {
        name: "ZipFile",
        attributes: &[
            ("Name", Kind::Text),
            ("RootDir", Kind::Text),
            ("Output", Kind::Text),
            ("Compression", Kind::Compression),
        ],
        required: &[],
        children: &["Include", "Match"],
    },
    ElementRule { name: "Include", attributes: INCLUDE_ATTRS, required: &[], children: &[] },
    ElementRule { name: "Match", attributes: MATCH_ATTRS, required: &[], children: &[] },
    ElementRule {
        name: "PreBuildEvent",
        attributes: EVENT_ATTRS,
        required: &[],
        children: &["Command"],
    },
    ElementRule {
        name: "PostBuildEvent",
        attributes: EVENT_ATTRS,
        required: &[],
        children: &["Command"],
    },
    ElementRule {
        name: "PreImportEvent",
        attributes: EVENT_ATTRS,
        required: &[],
        children: &["Command"],
    },
    ElementRule {
        name: "PostImportEvent",
        attributes: EVENT_ATTRS,
        required: &[],
        children: &["Command"],
    },
    ElementRule { name: "Command", attributes: &[], required: &[], children: &[] },
];

fn rule(name: &str) -> Option<&'static ElementRule> {
    RULES.iter().find(|r| r.name == name)
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Element path, e.g. `PapyrusProject/Packages/Package[1]`
    pub path: String,
    /// What is wrong
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Collect every schema violation in a document.
pub fn check(root: &Element) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    if root.name != ROOT {
        issues.push(SchemaIssue {
            path: root.name.clone(),
            message: format!("root element must be <{}>", ROOT),
        });
        return issues;
    }
    check_element(root, root.name.clone(), &mut issues);
    issues
}

/// Validate a document; all violations are reported in one error.
pub fn validate(root: &Element) -> Result<(), DescriptorError> {
    let issues = check(root);
    if issues.is_empty() {
        return Ok(());
    }
    let lines: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
    Err(DescriptorError::Schema(format!(
        "Failed to validate project descriptor:\n  {}",
        lines.join("\n  ")
    )))
}

fn check_element(el: &Element, path: String, issues: &mut Vec<SchemaIssue>) {
    let Some(rule) = rule(&el.name) else {
        issues.push(SchemaIssue { path, message: "unknown element".to_string() });
        return;
    };

    for (name, value) in &el.attributes {
        match rule.attributes.iter().find(|(n, _)| n == name) {
            None => issues.push(SchemaIssue {
                path: path.clone(),
                message: format!("unknown attribute \"{}\"", name),
            }),
            Some((_, Kind::Bool)) if !is_bool_literal(value) => issues.push(SchemaIssue {
                path: path.clone(),
                message: format!("attribute \"{}\" must be a boolean, got \"{}\"", name, value),
            }),
            Some((_, Kind::Compression)) if parse_compression(value).is_none() => {
                issues.push(SchemaIssue {
                    path: path.clone(),
                    message: format!(
                        "attribute \"{}\" must be \"store\" or \"deflate\", got \"{}\"",
                        name, value
                    ),
                })
            }
            Some(_) => {}
        }
    }

    for required in rule.required {
        if el.attr(required).is_none() {
            issues.push(SchemaIssue {
                path: path.clone(),
                message: format!("missing required attribute \"{}\"", required),
            });
        }
    }

    for (i, child) in el.children.iter().enumerate() {
        let child_path = format!("{}/{}[{}]", path, child.name, i + 1);
        if !rule.children.contains(&child.name.as_str()) {
            issues.push(SchemaIssue {
                path: child_path,
                message: format!("<{}> is not allowed inside <{}>", child.name, el.name),
            });
            continue;
        }
        check_element(child, child_path, issues);
    }
}

/// Parse a descriptor boolean: `true` or `1` (any case) is true, anything else false.
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn is_bool_literal(value: &str) -> bool {
    let value = value.trim();
    ["true", "false", "1", "0"].iter().any(|b| value.eq_ignore_ascii_case(b))
}

/// Zip compression method names accepted by `Compression`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZipCompression {
    /// No compression
    Store,
    /// Deflate
    #[default]
    Deflate,
}

impl ZipCompression {
    /// Attribute spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ZipCompression::Store => "store",
            ZipCompression::Deflate => "deflate",
        }
    }
}

/// Parse a `Compression` attribute value, ignoring case.
pub fn parse_compression(value: &str) -> Option<ZipCompression> {
    match value.trim().to_ascii_lowercase().as_str() {
        "store" => Some(ZipCompression::Store),
        "deflate" => Some(ZipCompression::Deflate),
        _ => None,
    }
}

/// Values used for absent attributes.
#[derive(Debug, Clone, Default)]
pub struct SchemaDefaults {
    /// Descriptor file stem
    pub project_name: String,
    /// Descriptor directory
    pub project_dir: String,
    /// Flags file from options
    pub flags: String,
    /// Artifact output directory from options
    pub output: String,
    /// Package output directory from options
    pub package_output: String,
    /// Zip output directory from options
    pub zip_output: String,
}

/// Fill absent attributes with their defaults.
pub fn fill_defaults(root: &mut Element, defaults: &SchemaDefaults) {
    root.set_default_attr("Game", "");
    root.set_default_attr("Flags", defaults.flags.as_str());
    root.set_default_attr("Output", defaults.output.as_str());
    for flag in ["Optimize", "Release", "Final", "Anonymize", "Package", "Zip"] {
        root.set_default_attr(flag, "False");
    }

    for child in &mut root.children {
        match child.name.as_str() {
            "Folders" => {
                for folder in &mut child.children {
                    folder.set_default_attr("NoRecurse", "False");
                }
            }
            "Packages" => {
                child.set_default_attr("Output", defaults.package_output.as_str());
                for package in &mut child.children {
                    package.set_default_attr("Name", defaults.project_name.as_str());
                    package.set_default_attr("RootDir", defaults.project_dir.as_str());
                    fill_rule_defaults(package);
                }
            }
            "ZipFiles" => {
                child.set_default_attr("Output", defaults.zip_output.as_str());
                let output = child.attr("Output").unwrap_or_default().to_string();
                for zip in &mut child.children {
                    zip.set_default_attr("Name", defaults.project_name.as_str());
                    zip.set_default_attr("RootDir", defaults.project_dir.as_str());
                    zip.set_default_attr("Output", output.as_str());
                    zip.set_default_attr("Compression", ZipCompression::default().as_str());
                    fill_rule_defaults(zip);
                }
            }
            name if EVENT_ELEMENTS.contains(&name) => {
                child.set_default_attr("Description", "");
                child.set_default_attr("UseInBuild", "True");
            }
            _ => {}
        }
    }
}

fn fill_rule_defaults(target: &mut Element) {
    for rule in &mut target.children {
        rule.set_default_attr("NoRecurse", "False");
        rule.set_default_attr("RewriteToPath", "False");
        rule.set_default_attr("Path", "");
        if rule.name == "Match" {
            rule.set_default_attr("In", ".");
            rule.set_default_attr("Exclude", "");
        }
    }
}
