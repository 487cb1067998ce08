//! Project descriptor loading
//!
//! A descriptor is an XML document rooted at `<PapyrusProject>`. It is parsed
//! into a small owned [`Element`] tree with comments, processing instructions
//! and namespace prefixes dropped, then validated against the built-in
//! [`schema`] and run through variable substitution.

pub mod schema;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::paths::NormalizedPath;
use crate::variables::{VariableError, VariableTable};

/// Error type for descriptor loading
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DescriptorError {
    /// Failed to read the descriptor file
    #[error("cannot read descriptor {}: {1}", .0.display())]
    Io(PathBuf, #[source] io::Error),
    /// The text is not well-formed XML
    #[error("malformed descriptor: {0}")]
    Xml(String),
    /// The document does not match the schema
    #[error("{0}")]
    Schema(String),
    /// A required attribute is absent
    #[error("<{element}> is missing the required attribute \"{attribute}\"")]
    MissingAttribute {
        /// Element name
        element: String,
        /// Attribute name
        attribute: String,
    },
    /// A variable declaration is invalid
    #[error(transparent)]
    Variable(#[from] VariableError),
}

/// An XML element with its attributes, trimmed text and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Local name (namespace prefix stripped)
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Concatenated, trimmed text content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<Element>,
}

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Attribute value, or an error naming the element when absent.
    pub fn required_attr(&self, name: &str) -> Result<&str, DescriptorError> {
        self.attr(name).ok_or_else(|| DescriptorError::MissingAttribute {
            element: self.name.clone(),
            attribute: name.to_string(),
        })
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Set an attribute only if it is absent.
    pub fn set_default_attr(&mut self, name: &str, value: impl Into<String>) {
        if self.attr(name).is_none() {
            self.attributes.push((name.to_string(), value.into()));
        }
    }

    /// Boolean attribute, `false` when absent.
    pub fn bool_attr(&self, name: &str) -> bool {
        self.attr(name).is_some_and(schema::parse_bool)
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of every `<item>` child of the `<group>` child, skipping empty text.
    pub fn child_texts<'a>(&'a self, group: &str, item: &'a str) -> Vec<&'a str> {
        self.child(group)
            .map(|g| g.children_named(item).map(|c| c.text.as_str()).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Apply a function to this element and every descendant, depth first.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }
}

/// A parsed project descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Absolute path of the descriptor file
    pub path: NormalizedPath,
    /// Root `<PapyrusProject>` element
    pub root: Element,
}

impl Descriptor {
    /// Read and parse a descriptor file.
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let text = fs::read_to_string(path).map_err(|e| DescriptorError::Io(path.to_path_buf(), e))?;
        let base = std::env::current_dir().map_err(|e| DescriptorError::Io(path.to_path_buf(), e))?;
        Self::parse(&text, NormalizedPath::resolve(&base, path))
    }

    /// Parse descriptor text. `path` locates the project directory.
    pub fn parse(text: &str, path: NormalizedPath) -> Result<Self, DescriptorError> {
        let root = parse_document(text)?;
        Ok(Self { path, root })
    }

    /// Directory containing the descriptor.
    pub fn project_dir(&self) -> NormalizedPath {
        self.path.parent().unwrap_or_else(|| self.path.clone())
    }

    /// Descriptor file name without its extension.
    pub fn project_name(&self) -> String {
        self.path
            .as_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Build the variable table from the `<Variables>` block.
    pub fn variable_table(&self) -> Result<VariableTable, DescriptorError> {
        let mut declarations = Vec::new();
        if let Some(group) = self.root.child("Variables") {
            for var in group.children_named("Variable") {
                let name = var.required_attr("Name")?;
                let value = var.required_attr("Value")?;
                declarations.push((name.to_string(), value.to_string()));
            }
        }
        Ok(VariableTable::from_declarations(declarations)?)
    }

    /// Substitute variables into every text node and attribute value.
    pub fn apply_variables(&mut self, table: &VariableTable) {
        if table.is_empty() {
            return;
        }
        self.root.walk_mut(&mut |el| {
            el.text = table.substitute(&el.text);
            for (_, value) in &mut el.attributes {
                *value = table.substitute(value);
            }
        });
    }
}

/// Parse XML text into an element tree rooted at the document element.
pub fn parse_document(text: &str) -> Result<Element, DescriptorError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            DescriptorError::Xml(format!("{} at byte {}", e, reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let el = element_from_start(&start)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| DescriptorError::Xml("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| DescriptorError::Xml(e.to_string()))?;
                push_text(&mut stack, &text);
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            // comments, declarations, processing instructions, doctype
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DescriptorError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| DescriptorError::Xml("document has no root element".to_string()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, DescriptorError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut el = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DescriptorError::Xml(e.to_string()))?;
        let key = attr.key.local_name();
        let key = String::from_utf8_lossy(key.as_ref()).into_owned();
        // namespace declarations are not project attributes
        if key == "xmlns" || attr.key.as_ref().starts_with(b"xmlns:") {
            continue;
        }
        let value = attr.unescape_value().map_err(|e| DescriptorError::Xml(e.to_string()))?;
        el.attributes.push((key, value.trim().to_string()));
    }
    Ok(el)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), DescriptorError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => return Err(DescriptorError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) {
    if let Some(el) = stack.last_mut() {
        if !el.text.is_empty() {
            el.text.push(' ');
        }
        el.text.push_str(text.trim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version='1.0'?>
<!-- project file -->
<PapyrusProject xmlns="PapyrusProject.xsd" Game="fo4" Optimize="true">
  <Variables>
    <Variable Name="Mod" Value="MyMod"/>
  </Variables>
  <Imports>
    <Import>@Mod\Scripts</Import>
    <!-- <Import>disabled</Import> -->
  </Imports>
  <Scripts>
    <Script>Quest.psc</Script>
  </Scripts>
</PapyrusProject>"#;

    fn sample() -> Descriptor {
        Descriptor::parse(SAMPLE, NormalizedPath::new("/mods/MyMod/MyMod.ppj").unwrap()).unwrap()
    }

    #[test]
    fn test_parse_tree() {
        let d = sample();
        assert_eq!(d.root.name, "PapyrusProject");
        assert_eq!(d.root.attr("Game"), Some("fo4"));
        assert!(d.root.bool_attr("Optimize"));
        assert!(!d.root.bool_attr("Release"));
        assert_eq!(d.root.child_texts("Imports", "Import"), vec!["@Mod\\Scripts"]);
    }

    #[test]
    fn test_namespace_attribute_dropped() {
        let d = sample();
        assert!(d.root.attr("xmlns").is_none());
    }

    #[test]
    fn test_comments_stripped() {
        let d = sample();
        let imports = d.root.child("Imports").unwrap();
        assert_eq!(imports.children.len(), 1);
    }

    #[test]
    fn test_project_name_and_dir() {
        let d = sample();
        assert_eq!(d.project_name(), "MyMod");
        assert_eq!(d.project_dir().as_path(), Path::new("/mods/MyMod"));
    }

    #[test]
    fn test_apply_variables() {
        let mut d = sample();
        let table = d.variable_table().unwrap();
        d.apply_variables(&table);
        assert_eq!(d.root.child_texts("Imports", "Import"), vec!["MyMod\\Scripts"]);
    }

    #[test]
    fn test_variable_missing_value() {
        let text = r#"<PapyrusProject><Variables><Variable Name="A"/></Variables></PapyrusProject>"#;
        let d = Descriptor::parse(text, NormalizedPath::new("/p/x.ppj").unwrap()).unwrap();
        let err = d.variable_table().unwrap_err();
        assert!(matches!(err, DescriptorError::MissingAttribute { .. }));
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_document("<PapyrusProject><Scripts></PapyrusProject>").unwrap_err();
        assert!(matches!(err, DescriptorError::Xml(_)));
    }

    #[test]
    fn test_entities_unescaped() {
        let root = parse_document(r#"<A Name="x &amp; y">a &lt; b</A>"#).unwrap();
        assert_eq!(root.attr("Name"), Some("x & y"));
        assert_eq!(root.text, "a < b");
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Test.ppj");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let d = Descriptor::load(&path).unwrap();
        assert_eq!(d.project_name(), "Test");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Descriptor::load(Path::new("/nonexistent/none.ppj")).unwrap_err();
        assert!(matches!(err, DescriptorError::Io(..)));
    }
}
