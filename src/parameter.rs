//! Parameter registry: leaf config values and ordered groups.
//!
//! Every value lives in a fixed-capacity byte buffer sized at
//! construction, so the persistent layout is fully determined by the
//! registration order of the tree. Load, store, render and update all
//! walk the tree in that same order.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use crate::request::WebRequest;

/// Default capacity for text values (ssid, thing name, ...).
pub const WORD_LEN: usize = 33;
/// Default capacity for password values.
pub const PASSWORD_LEN: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Password,
    Number,
}

impl ParamKind {
    fn input_type(self) -> &'static str {
        match self {
            ParamKind::Text => "text",
            ParamKind::Password => "password",
            ParamKind::Number => "number",
        }
    }
}

/// A single named configuration value.
///
/// The buffer length is the serialized width of this item and never
/// changes after construction. The logical text value is the bytes
/// before the first NUL.
pub struct Parameter {
    id: String,
    label: String,
    default_value: String,
    value: Box<[u8]>,
    kind: ParamKind,
    pub visible: bool,
    pub error_message: Option<String>,
}

impl Parameter {
    pub fn new(kind: ParamKind, label: &str, id: &str, default_value: &str, capacity: usize) -> Self {
        let mut p = Self {
            id: id.to_string(),
            label: label.to_string(),
            default_value: default_value.to_string(),
            value: vec![0u8; capacity].into_boxed_slice(),
            kind,
            visible: true,
            error_message: None,
        };
        p.set_value(default_value);
        p
    }

    pub fn text(label: &str, id: &str, default_value: &str, capacity: usize) -> Self {
        Self::new(ParamKind::Text, label, id, default_value, capacity)
    }

    pub fn password(label: &str, id: &str, capacity: usize) -> Self {
        Self::new(ParamKind::Password, label, id, "", capacity)
    }

    pub fn number(label: &str, id: &str, default_value: &str, capacity: usize) -> Self {
        Self::new(ParamKind::Number, label, id, default_value, capacity)
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// Logical text value: buffer bytes up to the first NUL.
    pub fn value(&self) -> String {
        let end = self.value.iter().position(|&b| b == 0).unwrap_or(self.value.len());
        String::from_utf8_lossy(&self.value[..end]).into_owned()
    }

    /// Copy `s` into the buffer, capped to the buffer capacity and
    /// NUL padded. Truncation backs off to a character boundary so a
    /// capped value stays valid UTF-8.
    pub fn set_value(&mut self, s: &str) {
        let mut len = s.len().min(self.value.len());
        while len > 0 && !s.is_char_boundary(len) {
            len -= 1;
        }
        self.value[..len].copy_from_slice(&s.as_bytes()[..len]);
        self.value[len..].fill(0);
    }

    pub fn storage_size(&self) -> usize {
        self.value.len()
    }

    pub fn apply_default_value(&mut self) {
        let default = self.default_value.clone();
        self.set_value(&default);
    }

    pub fn load_value(&mut self, read: &mut dyn FnMut(&mut [u8])) {
        read(&mut self.value);
    }

    pub fn store_value(&self, write: &mut dyn FnMut(&[u8])) {
        write(&self.value);
    }

    pub fn clear_error_message(&mut self) {
        self.error_message = None;
    }

    /// Render a labeled input. Invisible items render nothing; they
    /// still take part in load/store.
    pub fn render_html(&self, has_submitted_data: bool, req: &dyn WebRequest) -> String {
        if !self.visible {
            return String::new();
        }

        // Passwords are never echoed back into the form.
        let current = if self.kind == ParamKind::Password {
            String::new()
        } else if has_submitted_data {
            req.field_value(&self.id)
        } else {
            self.value()
        };

        let class = if self.error_message.is_some() { "de" } else { "" };
        let mut html = format!(
            "<div class=\"{}\"><label for=\"{}\">{}</label><input type=\"{}\" id=\"{}\" name=\"{}\" maxlength=\"{}\" value=\"{}\"/>",
            class,
            self.id,
            attr_escape(&self.label),
            self.kind.input_type(),
            self.id,
            self.id,
            self.value.len(),
            attr_escape(&current),
        );
        if let Some(error) = &self.error_message {
            html.push_str(&format!("<div class=\"em\">{}</div>", attr_escape(error)));
        }
        html.push_str("</div>\n");
        html
    }

    /// Take this item's submitted value into the buffer. An empty
    /// submitted password keeps the previously stored one, so users
    /// are not forced to retype it on every save.
    pub fn update(&mut self, req: &dyn WebRequest) {
        if !req.has_field(&self.id) {
            return;
        }
        let submitted = req.field_value(&self.id);
        if self.kind == ParamKind::Password && submitted.is_empty() {
            return;
        }
        self.set_value(&submitted);
    }
}

/// An ordered composite of parameters and nested groups.
///
/// Insertion order is the load/store/render/update order.
pub struct ParameterGroup {
    id: String,
    label: Option<String>,
    children: Vec<NodeRef>,
}

impl ParameterGroup {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            label: None,
            children: Vec::new(),
        }
    }

    pub fn with_label(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: Some(label.to_string()),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_item(&mut self, item: NodeRef) {
        self.children.push(item);
    }

    pub fn storage_size(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.lock().unwrap().storage_size())
            .sum()
    }

    pub fn apply_default_value(&mut self) {
        for child in &self.children {
            child.lock().unwrap().apply_default_value();
        }
    }

    pub fn load_value(&mut self, read: &mut dyn FnMut(&mut [u8])) {
        for child in &self.children {
            child.lock().unwrap().load_value(read);
        }
    }

    pub fn store_value(&self, write: &mut dyn FnMut(&[u8])) {
        for child in &self.children {
            child.lock().unwrap().store_value(write);
        }
    }

    pub fn clear_error_message(&mut self) {
        for child in &self.children {
            child.lock().unwrap().clear_error_message();
        }
    }

    pub fn render_html(&self, has_submitted_data: bool, req: &dyn WebRequest) -> String {
        let mut html = String::new();
        if let Some(label) = &self.label {
            html.push_str(&format!("<fieldset id=\"{}\"><legend>{}</legend>\n", self.id, attr_escape(label)));
        }
        for child in &self.children {
            html.push_str(&child.lock().unwrap().render_html(has_submitted_data, req));
        }
        if self.label.is_some() {
            html.push_str("</fieldset>\n");
        }
        html
    }

    pub fn update(&mut self, req: &dyn WebRequest) {
        for child in &self.children {
            child.lock().unwrap().update(req);
        }
    }
}

/// Tagged registry node. Groups recurse over children, items carry the
/// bytes.
pub enum Node {
    Item(Parameter),
    Group(ParameterGroup),
}

/// Shared handle to a node. A node can be linked under several
/// traversal roots (e.g. the system group is reachable both from the
/// form renderer and from the authoritative persistence root) without
/// duplicating its storage.
pub type NodeRef = Arc<Mutex<Node>>;

impl Node {
    pub fn item(parameter: Parameter) -> NodeRef {
        Arc::new(Mutex::new(Node::Item(parameter)))
    }

    pub fn group(group: ParameterGroup) -> NodeRef {
        Arc::new(Mutex::new(Node::Group(group)))
    }

    pub fn as_item(&self) -> Option<&Parameter> {
        match self {
            Node::Item(p) => Some(p),
            Node::Group(_) => None,
        }
    }

    pub fn as_item_mut(&mut self) -> Option<&mut Parameter> {
        match self {
            Node::Item(p) => Some(p),
            Node::Group(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut ParameterGroup> {
        match self {
            Node::Item(_) => None,
            Node::Group(g) => Some(g),
        }
    }

    pub fn storage_size(&self) -> usize {
        match self {
            Node::Item(p) => p.storage_size(),
            Node::Group(g) => g.storage_size(),
        }
    }

    pub fn apply_default_value(&mut self) {
        match self {
            Node::Item(p) => p.apply_default_value(),
            Node::Group(g) => g.apply_default_value(),
        }
    }

    pub fn load_value(&mut self, read: &mut dyn FnMut(&mut [u8])) {
        match self {
            Node::Item(p) => p.load_value(read),
            Node::Group(g) => g.load_value(read),
        }
    }

    pub fn store_value(&self, write: &mut dyn FnMut(&[u8])) {
        match self {
            Node::Item(p) => p.store_value(write),
            Node::Group(g) => g.store_value(write),
        }
    }

    pub fn clear_error_message(&mut self) {
        match self {
            Node::Item(p) => p.clear_error_message(),
            Node::Group(g) => g.clear_error_message(),
        }
    }

    pub fn render_html(&self, has_submitted_data: bool, req: &dyn WebRequest) -> String {
        match self {
            Node::Item(p) => p.render_html(has_submitted_data, req),
            Node::Group(g) => g.render_html(has_submitted_data, req),
        }
    }

    pub fn update(&mut self, req: &dyn WebRequest) {
        match self {
            Node::Item(p) => p.update(req),
            Node::Group(g) => g.update(req),
        }
    }
}

fn attr_escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRequest;

    fn tree() -> NodeRef {
        let mut system = ParameterGroup::with_label("sys", "System");
        system.add_item(Node::item(Parameter::text("Name", "name", "mything", 8)));
        system.add_item(Node::item(Parameter::password("Password", "pass", 16)));

        let mut custom = ParameterGroup::new("custom");
        custom.add_item(Node::item(
            Parameter::number("Port", "port", "80", 6).with_visible(false),
        ));

        let mut all = ParameterGroup::new("all");
        all.add_item(Node::group(system));
        all.add_item(Node::group(custom));
        Node::group(all)
    }

    #[test]
    fn storage_size_sums_leaves_recursively() {
        let root = tree();
        assert_eq!(root.lock().unwrap().storage_size(), 8 + 16 + 6);
    }

    #[test]
    fn value_is_capped_to_capacity() {
        let mut p = Parameter::text("Name", "name", "", 4);
        p.set_value("abcdefgh");
        assert_eq!(p.value(), "abcd");
        assert_eq!(p.storage_size(), 4);

        // Multi-byte chars are never cut in half.
        p.set_value("ab\u{00e9}x");
        assert_eq!(p.value(), "ab\u{00e9}");
    }

    #[test]
    fn apply_default_restores_initial_value() {
        let mut p = Parameter::text("Name", "name", "mything", 8);
        p.set_value("other");
        p.apply_default_value();
        assert_eq!(p.value(), "mything");
    }

    #[test]
    fn traversal_order_matches_registration_order() {
        let root = tree();

        let mut stored = Vec::new();
        root.lock()
            .unwrap()
            .store_value(&mut |buf| stored.push(buf.len()));
        assert_eq!(stored, vec![8, 16, 6]);

        let mut loaded = Vec::new();
        root.lock().unwrap().load_value(&mut |buf| {
            loaded.push(buf.len());
            buf.fill(0);
        });
        assert_eq!(loaded, stored);
    }

    #[test]
    fn invisible_item_renders_nothing_but_keeps_storage() {
        let req = MockRequest::new();
        let root = tree();
        let html = root.lock().unwrap().render_html(false, &req);
        assert!(html.contains("name=\"name\""));
        assert!(html.contains("name=\"pass\""));
        assert!(!html.contains("name=\"port\""));

        // Still three leaves in the serialized layout.
        let mut widths = Vec::new();
        root.lock().unwrap().store_value(&mut |buf| widths.push(buf.len()));
        assert_eq!(widths.len(), 3);
    }

    #[test]
    fn password_value_is_not_echoed() {
        let mut p = Parameter::password("Password", "pass", 16);
        p.set_value("secret88");
        let req = MockRequest::new();
        let html = p.render_html(false, &req);
        assert!(!html.contains("secret88"));
        assert!(html.contains("type=\"password\""));
    }

    #[test]
    fn update_takes_submitted_value() {
        let req = MockRequest::new().with_field("name", "renamed");
        let root = tree();
        root.lock().unwrap().update(&req);
        let sized = root.lock().unwrap().storage_size();
        assert_eq!(sized, 30);

        let mut bytes = Vec::new();
        root.lock().unwrap().store_value(&mut |buf| bytes.push(buf.to_vec()));
        assert_eq!(&bytes[0][..7], b"renamed");
    }

    #[test]
    fn empty_password_submit_keeps_previous_value() {
        let mut p = Parameter::password("Password", "pass", 16);
        p.set_value("secret88");

        let req = MockRequest::new().with_field("pass", "");
        p.update(&req);
        assert_eq!(p.value(), "secret88");

        let req = MockRequest::new().with_field("pass", "newsecret");
        p.update(&req);
        assert_eq!(p.value(), "newsecret");
    }

    #[test]
    fn update_skips_absent_fields() {
        let mut p = Parameter::text("Name", "name", "mything", 8);
        let req = MockRequest::new();
        p.update(&req);
        assert_eq!(p.value(), "mything");
    }

    #[test]
    fn render_escapes_markup_in_values() {
        let mut p = Parameter::text("Name", "name", "", 32);
        p.set_value("<b>\"x\"</b>");
        let req = MockRequest::new();
        let html = p.render_html(false, &req);
        assert!(html.contains("&lt;b&gt;&quot;x&quot;&lt;/b&gt;"));
    }

    #[test]
    fn error_message_marks_the_input() {
        let mut p = Parameter::text("Name", "name", "", 8);
        p.error_message = Some("Give a name with at least 3 characters.".to_string());
        let req = MockRequest::new();
        let html = p.render_html(false, &req);
        assert!(html.contains("class=\"de\""));
        assert!(html.contains("at least 3 characters"));

        p.clear_error_message();
        assert!(p.error_message.is_none());
    }
}
