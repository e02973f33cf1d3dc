//! Workbook markup: a small element tree built with `quick-xml`, plus typed
//! accessors for the worksheet parts the spec builder reads.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{BridgeError, BridgeResult};

/// One element of the parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    /// Attributes keep their qualified names (`user:ui-enumeration`).
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given tag.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// First descendant with the given tag.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.descendants().find(|e| e.name == name)
    }

    pub fn find_all(&self, name: &str) -> Vec<&XmlElement> {
        self.descendants().filter(|e| e.name == name).collect()
    }

    /// First descendant matching the path, where the first segment may be at
    /// any depth and each later segment is a direct child of the previous.
    pub fn find_path(&self, path: &[&str]) -> Option<&XmlElement> {
        let (first, rest) = path.split_first()?;
        self.descendants()
            .filter(|e| e.name == *first)
            .find_map(|start| {
                rest.iter()
                    .try_fold(start, |current, segment| current.child(segment))
            })
    }
}

/// Pre-order iterator over an element's descendants.
pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Parse a markup string into its root element.
pub fn parse_xml(input: &str) -> BridgeResult<XmlElement> {
    let input = input.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| BridgeError::parse("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| BridgeError::parse(format!("invalid text content: {e}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BridgeError::parse(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(BridgeError::parse("document ended before all elements were closed"));
    }
    root.ok_or_else(|| BridgeError::parse("document has no root element"))
}

fn element_from_start(e: &BytesStart<'_>) -> BridgeResult<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| BridgeError::parse(format!("invalid tag name: {e}")))?
        .to_string();

    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| BridgeError::parse(format!("attribute error: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| BridgeError::parse(format!("attribute key error: {e}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| BridgeError::parse(format!("attribute value error: {e}")))?
            .to_string();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// A sort on one shelf field computed from another field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedSort {
    pub column: String,
    pub using: String,
    pub direction: Option<String>,
}

impl ComputedSort {
    pub fn is_descending(&self) -> bool {
        self.direction
            .as_deref()
            .map(|d| d.eq_ignore_ascii_case("DESC"))
            .unwrap_or(true)
    }
}

/// A parsed workbook document.
#[derive(Debug, Clone)]
pub struct WorkbookDocument {
    root: XmlElement,
}

impl WorkbookDocument {
    pub fn parse(xml: &str) -> BridgeResult<Self> {
        let root = parse_xml(xml)?;
        if root.name != "workbook" {
            return Err(BridgeError::parse(format!(
                "expected a <workbook> root element, found <{}>",
                root.name
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn worksheet_names(&self) -> Vec<&str> {
        self.root
            .find_all("worksheet")
            .into_iter()
            .filter_map(|w| w.attr("name"))
            .collect()
    }

    /// Find a worksheet by case-insensitive name, along with its window.
    pub fn worksheet(&self, name: &str) -> Option<Worksheet<'_>> {
        let element = self.root.find_all("worksheet").into_iter().find(|w| {
            w.attr("name")
                .map(|n| n.to_lowercase() == name.to_lowercase())
                .unwrap_or(false)
        })?;

        let window = self.root.find_all("window").into_iter().find(|w| {
            w.attr("class") == Some("worksheet")
                && w.attr("name")
                    .map(|n| n.to_lowercase() == name.to_lowercase())
                    .unwrap_or(false)
        });

        Some(Worksheet { element, window })
    }
}

/// One worksheet and its (optional) window element.
#[derive(Debug, Clone, Copy)]
pub struct Worksheet<'a> {
    pub element: &'a XmlElement,
    pub window: Option<&'a XmlElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shelf {
    Rows,
    Columns,
}

impl Shelf {
    pub fn tag(&self) -> &'static str {
        match self {
            Shelf::Rows => "rows",
            Shelf::Columns => "cols",
        }
    }
}

impl<'a> Worksheet<'a> {
    pub fn name(&self) -> &'a str {
        self.element.attr("name").unwrap_or_default()
    }

    /// Raw text of the rows or columns shelf, if present and non-empty.
    pub fn shelf_text(&self, shelf: Shelf) -> Option<&'a str> {
        self.element
            .find(shelf.tag())
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn computed_sort(&self, column: &str) -> Option<ComputedSort> {
        self.element
            .find_all("computed-sort")
            .into_iter()
            .find(|s| s.attr("column") == Some(column))
            .and_then(|s| {
                Some(ComputedSort {
                    column: s.attr("column")?.to_string(),
                    using: s.attr("using")?.to_string(),
                    direction: s.attr("direction").map(str::to_string),
                })
            })
    }

    /// `class` of the first `<mark>` element.
    pub fn mark_class(&self) -> Option<&'a str> {
        self.element.find("mark").and_then(|m| m.attr("class"))
    }

    /// Value of a `<format attr=...>` inside the mark style rule.
    pub fn mark_format(&self, attr: &str) -> Option<&'a str> {
        self.element
            .find_all("style-rule")
            .into_iter()
            .find(|r| r.attr("element") == Some("mark"))
            .and_then(|rule| {
                rule.find_all("format")
                    .into_iter()
                    .find(|f| f.attr("attr") == Some(attr))
            })
            .and_then(|f| f.attr("value"))
    }

    /// Column encoded on the given pane encoding (`color`, `text`, ...).
    pub fn pane_encoding(&self, encoding: &str) -> Option<&'a str> {
        self.element
            .find_path(&["pane", "encodings"])
            .and_then(|encodings| encodings.find(encoding))
            .and_then(|e| e.attr("column"))
            .filter(|c| !c.is_empty())
    }

    pub fn filters(&self) -> Vec<&'a XmlElement> {
        self.element.find_all("filter")
    }

    /// `type` of the window's viewpoint zoom.
    pub fn zoom_type(&self) -> Option<&'a str> {
        self.window
            .and_then(|w| w.find_path(&["viewpoint", "zoom"]))
            .and_then(|z| z.attr("type"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKBOOK: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <worksheets>
    <worksheet name='Sales by Region'>
      <table>
        <view>
          <computed-sort column='[ds].[none:Region:nk]' direction='ASC' using='[ds].[sum:Sales:qk]' />
        </view>
        <style>
          <style-rule element='mark'>
            <format attr='mark-color' value='#4e79a7' />
          </style-rule>
        </style>
        <panes>
          <pane>
            <mark class='Bar' />
            <encodings>
              <color column='[ds].[none:Segment:nk]' />
            </encodings>
          </pane>
        </panes>
        <rows>[ds].[none:Region:nk]</rows>
        <cols>[ds].[sum:Sales:qk]</cols>
      </table>
    </worksheet>
  </worksheets>
  <windows>
    <window class='worksheet' name='Sales By Region'>
      <viewpoint><zoom type='fit-width' /></viewpoint>
    </window>
  </windows>
</workbook>"#;

    #[test]
    fn test_parse_tree_and_queries() {
        let root = parse_xml(WORKBOOK).unwrap();
        assert_eq!(root.name, "workbook");
        assert_eq!(root.find_all("worksheet").len(), 1);
        assert_eq!(
            root.find("rows").map(|r| r.text.as_str()),
            Some("[ds].[none:Region:nk]")
        );
        assert!(root.find_path(&["pane", "encodings"]).is_some());
        assert!(root.find_path(&["pane", "missing"]).is_none());
    }

    #[test]
    fn test_worksheet_lookup_is_case_insensitive() {
        let doc = WorkbookDocument::parse(WORKBOOK).unwrap();
        let sheet = doc.worksheet("sales BY region").expect("worksheet");
        assert_eq!(sheet.name(), "Sales by Region");
        assert_eq!(sheet.shelf_text(Shelf::Columns), Some("[ds].[sum:Sales:qk]"));
        assert_eq!(sheet.mark_class(), Some("Bar"));
        assert_eq!(sheet.mark_format("mark-color"), Some("#4e79a7"));
        assert_eq!(sheet.pane_encoding("color"), Some("[ds].[none:Segment:nk]"));
        assert_eq!(sheet.zoom_type(), Some("fit-width"));
        assert!(doc.worksheet("Profit").is_none());
    }

    #[test]
    fn test_computed_sort() {
        let doc = WorkbookDocument::parse(WORKBOOK).unwrap();
        let sheet = doc.worksheet("Sales by Region").unwrap();
        let sort = sheet.computed_sort("[ds].[none:Region:nk]").unwrap();
        assert_eq!(sort.using, "[ds].[sum:Sales:qk]");
        assert!(!sort.is_descending());
        assert!(sheet.computed_sort("[ds].[sum:Sales:qk]").is_none());
    }

    #[test]
    fn test_attribute_entities_are_unescaped() {
        let root = parse_xml(r#"<g member='&quot;West&quot;' />"#).unwrap();
        assert_eq!(root.attr("member"), Some("\"West\""));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse_xml("<a><b></a>"), Err(BridgeError::Parse(_))));
        assert!(matches!(parse_xml(""), Err(BridgeError::Parse(_))));
        assert!(matches!(
            WorkbookDocument::parse("<datasource />"),
            Err(BridgeError::Parse(_))
        ));
    }
}
