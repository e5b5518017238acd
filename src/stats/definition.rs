use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use super::{MacroStats, StorageEntry};
use crate::parser::attributes::Attributes;

/// Direct children of a macro's `properties` element, grouped by tag name.
///
/// Definition files repeat some elements and omit others; every access goes
/// through [`PropertyBag::all`], which treats absent as empty and a single
/// element as a one-item sequence.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PropertyBag {
    nodes: HashMap<String, Vec<Attributes>>,
}

impl PropertyBag {
    pub fn all(&self, tag: &str) -> &[Attributes] {
        self.nodes.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, tag: String, attrs: Attributes) {
        self.nodes.entry(tag).or_default().push(attrs);
    }

    /// Summed workforce capacity, or `None` when no workforce node carries a number
    pub fn workforce_capacity(&self) -> Option<f64> {
        self.all("workforce")
            .iter()
            .filter_map(|node| node.first_number(&["capacity", "max", "value"]))
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
    }

    /// Positive cargo and storage declarations
    pub fn storage_entries(&self) -> Vec<StorageEntry> {
        ["cargo", "storage"]
            .iter()
            .flat_map(|tag| self.all(tag))
            .filter_map(|node| {
                let capacity = node.first_number(&["max", "capacity", "value"])?;
                if capacity <= 0.0 {
                    return None;
                }
                let tags = node
                    .first_of(&["tags", "tag"])
                    .map(|t| t.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                Some(StorageEntry { capacity, tags })
            })
            .collect()
    }

    pub fn to_stats(&self) -> MacroStats {
        MacroStats {
            workforce_capacity: self.workforce_capacity(),
            storage_entries: self.storage_entries(),
        }
    }
}

/// Read the first `macros > macro > properties` block of a definition document.
///
/// Returns `Ok(None)` for a well-formed document without such a block.
pub fn parse_macro_definition(xml: &str) -> Result<Option<PropertyBag>, String> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(true);
    config.expand_empty_elements = true;

    let mut path: Vec<String> = Vec::new();
    let mut bag: Option<PropertyBag> = None;
    let mut done = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if !done && is_properties_child(&path) {
                    let attrs = start
                        .attributes()
                        .filter_map(|a| a.ok())
                        .map(|a| {
                            (
                                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                                String::from_utf8_lossy(&a.value).into_owned(),
                            )
                        })
                        .collect();
                    bag.get_or_insert_with(PropertyBag::default)
                        .push(name.clone(), attrs);
                } else if !done && name == "properties" && is_macro_body(&path) {
                    bag.get_or_insert_with(PropertyBag::default);
                }
                path.push(name);
            }
            Event::End(_) => {
                if let Some(closed) = path.pop() {
                    if closed == "properties" && bag.is_some() {
                        done = true;
                    }
                }
            }
            Event::Eof => {
                if !path.is_empty() {
                    return Err(format!("document ended inside <{}>", path.join(">")));
                }
                return Ok(bag);
            }
            _ => {}
        }
    }
}

fn is_macro_body(path: &[String]) -> bool {
    path.len() == 2 && path[0] == "macros" && path[1] == "macro"
}

fn is_properties_child(path: &[String]) -> bool {
    path.len() == 3 && is_macro_body(&path[..2]) && path[2] == "properties"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_and_single_nodes_normalize_to_sequences() {
        let xml = r#"<macros><macro name="m"><properties>
            <workforce capacity="100"/><workforce max="50"/>
            <storage capacity="200" tag="container liquid"/>
            <cargo max="0" tags="solid"/>
        </properties></macro></macros>"#;
        let bag = parse_macro_definition(xml).unwrap().unwrap();

        assert_eq!(bag.all("workforce").len(), 2);
        assert!(bag.all("hull").is_empty());
        assert_eq!(bag.workforce_capacity(), Some(150.0));

        let entries = bag.storage_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].capacity, 200.0);
        assert_eq!(entries[0].tags, vec!["container", "liquid"]);
    }

    #[test]
    fn test_nested_property_elements_are_not_direct_children() {
        let xml = r#"<macros><macro name="m"><properties>
            <docks><cargo max="999"/></docks>
        </properties></macro></macros>"#;
        let bag = parse_macro_definition(xml).unwrap().unwrap();
        assert!(bag.storage_entries().is_empty());
        assert_eq!(bag.all("docks").len(), 1);
    }

    #[test]
    fn test_only_first_macro_is_read() {
        let xml = r#"<macros>
            <macro name="a"><properties><workforce capacity="10"/></properties></macro>
            <macro name="b"><properties><workforce capacity="20"/></properties></macro>
        </macros>"#;
        let bag = parse_macro_definition(xml).unwrap().unwrap();
        assert_eq!(bag.workforce_capacity(), Some(10.0));
    }

    #[test]
    fn test_missing_properties_and_broken_documents() {
        assert_eq!(parse_macro_definition("<macros><macro name=\"a\"/></macros>").unwrap(), None);
        assert!(parse_macro_definition("<macros><macro>").is_err());
    }
}
