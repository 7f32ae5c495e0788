//! Generic node tree produced by the container parser.
//!
//! Nodes are an intermediate representation: they are built once by
//! [`parse_fbx`](super::parse_fbx), interpreted by the loader, and dropped.

use std::borrow::Cow;

use armature_math::Vec3;

/// A single decoded property value.
///
/// Binary documents produce typed variants; the text variant stores every
/// datum as [`Property::Text`].
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    /// `Y`
    I16(i16),
    /// `C`
    Bool(bool),
    /// `I`
    I32(i32),
    /// `F`
    F32(f32),
    /// `D`
    F64(f64),
    /// `L`
    I64(i64),
    /// `f`
    F32Array(Vec<f32>),
    /// `d`
    F64Array(Vec<f64>),
    /// `l`
    I64Array(Vec<i64>),
    /// `i`
    I32Array(Vec<i32>),
    /// `b`
    BoolArray(Vec<bool>),
    /// `S`
    String(Vec<u8>),
    /// `R`
    Raw(Vec<u8>),
    /// Untyped datum from a text document
    Text(String),
}

impl Property {
    /// True for the homogeneous array variants.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Property::F32Array(_)
                | Property::F64Array(_)
                | Property::I64Array(_)
                | Property::I32Array(_)
                | Property::BoolArray(_)
        )
    }

    /// Numeric value of a scalar (text is parsed).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Property::I16(v) => Some(f64::from(*v)),
            Property::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Property::I32(v) => Some(f64::from(*v)),
            Property::F32(v) => Some(f64::from(*v)),
            Property::F64(v) => Some(*v),
            Property::I64(v) => Some(*v as f64),
            Property::String(bytes) | Property::Raw(bytes) => {
                String::from_utf8_lossy(bytes).trim().parse().ok()
            }
            Property::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer value of a scalar (text is parsed, floats truncate).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Property::I16(v) => Some(i64::from(*v)),
            Property::Bool(v) => Some(i64::from(*v)),
            Property::I32(v) => Some(i64::from(*v)),
            Property::I64(v) => Some(*v),
            Property::F32(v) => Some(*v as i64),
            Property::F64(v) => Some(*v as i64),
            Property::String(bytes) | Property::Raw(bytes) => parse_integer(&String::from_utf8_lossy(bytes)),
            Property::Text(text) => parse_integer(text),
            _ => None,
        }
    }

    /// Truthiness of a scalar. Text is false only when empty, `0` or `false`.
    pub fn as_bool(&self) -> bool {
        match self {
            Property::Text(text) => {
                let text = text.trim();
                !(text.is_empty() || text == "0" || text.eq_ignore_ascii_case("false"))
            }
            other => other.as_f64().map(|v| v != 0.0).unwrap_or(false),
        }
    }

    /// Raw bytes of a string, blob or text datum.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Property::String(bytes) | Property::Raw(bytes) => Some(bytes),
            Property::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// Textual form of a scalar, as the text variant would have stored it.
    ///
    /// Arrays render as comma-separated elements.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Property::I16(v) => Cow::Owned(v.to_string()),
            Property::Bool(v) => Cow::Owned(if *v { "1".into() } else { "0".into() }),
            Property::I32(v) => Cow::Owned(v.to_string()),
            Property::F32(v) => Cow::Owned(v.to_string()),
            Property::F64(v) => Cow::Owned(v.to_string()),
            Property::I64(v) => Cow::Owned(v.to_string()),
            Property::F32Array(values) => Cow::Owned(join(values)),
            Property::F64Array(values) => Cow::Owned(join(values)),
            Property::I64Array(values) => Cow::Owned(join(values)),
            Property::I32Array(values) => Cow::Owned(join(values)),
            Property::BoolArray(values) => {
                Cow::Owned(join(&values.iter().map(|v| u8::from(*v)).collect::<Vec<_>>()))
            }
            Property::String(bytes) | Property::Raw(bytes) => String::from_utf8_lossy(bytes),
            Property::Text(text) => Cow::Borrowed(text),
        }
    }

    fn append_integers(&self, out: &mut Vec<i32>) {
        match self {
            Property::I32Array(values) => out.extend_from_slice(values),
            Property::I64Array(values) => out.extend(values.iter().map(|v| *v as i32)),
            Property::BoolArray(values) => out.extend(values.iter().map(|v| i32::from(*v))),
            Property::F32Array(values) => out.extend(values.iter().map(|v| *v as i32)),
            Property::F64Array(values) => out.extend(values.iter().map(|v| *v as i32)),
            other => out.push(other.as_i64().unwrap_or(0) as i32),
        }
    }

    fn append_doubles(&self, out: &mut Vec<f64>) {
        match self {
            Property::F64Array(values) => out.extend_from_slice(values),
            Property::F32Array(values) => out.extend(values.iter().map(|v| f64::from(*v))),
            Property::I32Array(values) => out.extend(values.iter().map(|v| f64::from(*v))),
            Property::I64Array(values) => out.extend(values.iter().map(|v| *v as f64)),
            Property::BoolArray(values) => out.extend(values.iter().map(|v| if *v { 1.0 } else { 0.0 })),
            other => out.push(other.as_f64().unwrap_or(0.0)),
        }
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(|v| v as i64))
}

fn join<T: ToString>(values: &[T]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Strip a `Type::` prefix from an object identifier.
///
/// Some exporters prepend the object type to every ID.
pub fn process_id(id: &str) -> &str {
    match id.find("::") {
        Some(index) => &id[index + 2..],
        None => id,
    }
}

/// One record of the container tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    /// Record name (empty only for the synthetic document root)
    pub name: String,

    /// Ordered property values
    pub properties: Vec<Property>,

    /// Ordered child records
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// Property at `index` as text (empty when absent).
    pub fn string_at(&self, index: usize) -> Cow<'_, str> {
        self.properties
            .get(index)
            .map(Property::to_text)
            .unwrap_or(Cow::Borrowed(""))
    }

    /// True when the property at `index` renders as `value`.
    pub fn property_is(&self, index: usize, value: &str) -> bool {
        self.properties.get(index).is_some_and(|p| p.to_text() == value)
    }

    /// Object identifier at `index`, with any `Type::` prefix removed.
    pub fn id(&self, index: usize) -> String {
        process_id(&self.string_at(index)).to_string()
    }

    /// Object name stored at `index`, cut at the first NUL (binary names
    /// carry a `\0\x01Class` suffix).
    pub fn object_name(&self, index: usize) -> String {
        let text = self.string_at(index);
        match text.find('\0') {
            Some(end) => text[..end].to_string(),
            None => text.into_owned(),
        }
    }

    /// Float at `index` (0 when absent).
    pub fn f64_at(&self, index: usize) -> f64 {
        self.properties.get(index).and_then(Property::as_f64).unwrap_or(0.0)
    }

    /// Three consecutive scalar properties starting at `index`.
    pub fn vec3_at(&self, index: usize) -> Vec3 {
        Vec3::new(
            self.f64_at(index) as f32,
            self.f64_at(index + 1) as f32,
            self.f64_at(index + 2) as f32,
        )
    }

    /// Integer array carried by this node.
    ///
    /// Uses the array property at position 0 if there is one, otherwise every
    /// scalar property, otherwise the contents of an `a` child.
    pub fn int_vector(&self) -> Vec<i32> {
        let mut values = Vec::new();
        if let Some(source) = self.array_source() {
            for property in &source.properties {
                if !property.is_array() && property.to_text().starts_with('*') {
                    continue;
                }
                property.append_integers(&mut values);
            }
        }
        values
    }

    /// Float array carried by this node (see [`Node::int_vector`]).
    pub fn double_vector(&self) -> Vec<f64> {
        let mut values = Vec::new();
        if let Some(source) = self.array_source() {
            for property in &source.properties {
                if !property.is_array() && property.to_text().starts_with('*') {
                    continue;
                }
                property.append_doubles(&mut values);
            }
        }
        values
    }

    /// Entries of this object's `Properties60` / `Properties70` blocks, each
    /// paired with the index at which its value starts (3 and 4 respectively).
    pub fn object_properties(&self) -> Vec<(&Node, usize)> {
        let mut entries = Vec::new();
        for block in &self.children {
            let (entry_name, value_index) = match block.name.as_str() {
                "Properties60" => ("Property", 3),
                "Properties70" => ("P", 4),
                _ => continue,
            };
            entries.extend(block.children_named(entry_name).map(|entry| (entry, value_index)));
        }
        entries
    }

    fn array_source(&self) -> Option<&Node> {
        let has_values = self
            .properties
            .iter()
            .any(|p| p.is_array() || !p.to_text().starts_with('*'));
        if has_values {
            Some(self)
        } else {
            self.child("a")
        }
    }
}
