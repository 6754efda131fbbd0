//! Heterogeneous per-node annotations and the process-wide serdes registry.
//!
//! An annotation is an opaque value of any user type, stored on a node keyed
//! by its runtime type identity. Serialization never exposes that identity:
//! the registry maps each registered type to a canonical name wrapped in
//! `{...}` braces, and only registered types travel over the wire.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::cbor::{self, MapReader, MapWriter};

type SerializeFn = Box<dyn Fn(&dyn Any, &mut MapWriter) -> cbor::Result<()> + Send + Sync>;
type DeserializeFn = Box<dyn Fn(&MapReader) -> cbor::Result<Rc<dyn Any>> + Send + Sync>;

struct Entry {
    type_id: TypeId,
    key: String,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
    by_type: HashMap<TypeId, usize>,
    by_key: HashMap<String, usize>,
}

/// Process-wide serdes table. Populate it during an explicit bootstrap
/// phase before the first serialize/deserialize; mutation afterwards is
/// not supported.
static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(Mutex::default);

/// Registers serialization callbacks for annotation type `T` under the
/// given canonical name. The wire key becomes `{name}`. Registering the
/// same type or name again replaces the previous entry.
pub fn register<T: 'static>(
    name: &str,
    serialize: impl Fn(&T, &mut MapWriter) -> cbor::Result<()> + Send + Sync + 'static,
    deserialize: impl Fn(&MapReader) -> cbor::Result<T> + Send + Sync + 'static,
) {
    let entry = Entry {
        type_id: TypeId::of::<T>(),
        key: format!("{{{}}}", name),
        serialize: Box::new(move |value, map| {
            let value = value
                .downcast_ref::<T>()
                .expect("annotation registry type invariant");
            serialize(value, map)
        }),
        deserialize: Box::new(move |map| Ok(Rc::new(deserialize(map)?) as Rc<dyn Any>)),
    };

    let mut registry = REGISTRY.lock().expect("annotation registry lock");
    if let Some(&idx) = registry.by_type.get(&entry.type_id) {
        let old_key = registry.entries[idx].key.clone();
        registry.by_key.remove(&old_key);
        let key = entry.key.clone();
        registry.by_key.insert(key, idx);
        registry.entries[idx] = entry;
    } else {
        let idx = registry.entries.len();
        registry.by_type.insert(entry.type_id, idx);
        registry.by_key.insert(entry.key.clone(), idx);
        registry.entries.push(entry);
    }
}

/// Whether annotation type `T` has registered serdes callbacks.
pub fn is_registered<T: 'static>() -> bool {
    let registry = REGISTRY.lock().expect("annotation registry lock");
    registry.by_type.contains_key(&TypeId::of::<T>())
}

/// A per-object heterogeneous annotation map.
///
/// Cloning copies the shared annotation references, not the values.
#[derive(Clone, Default)]
pub struct Annotatable {
    annotations: HashMap<TypeId, Rc<dyn Any>>,
}

impl Annotatable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an annotation, replacing any previous value of the same type.
    pub fn set_annotation<T: 'static>(&mut self, value: T) {
        self.annotations.insert(TypeId::of::<T>(), Rc::new(value));
    }

    pub fn get_annotation<T: 'static>(&self) -> Option<Rc<T>> {
        self.annotations
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|rc| rc.downcast::<T>().ok())
    }

    pub fn has_annotation<T: 'static>(&self) -> bool {
        self.annotations.contains_key(&TypeId::of::<T>())
    }

    /// Detaches and returns the annotation of type `T`, if present.
    pub fn take_annotation<T: 'static>(&mut self) -> Option<Rc<T>> {
        self.annotations
            .remove(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast::<T>().ok())
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Copies the shared annotation references from `other` onto `self`.
    pub fn copy_annotations_from(&mut self, other: &Annotatable) {
        for (tid, value) in &other.annotations {
            self.annotations.insert(*tid, Rc::clone(value));
        }
    }

    /// Appends one `{TypeName}: payload` map entry per registered
    /// annotation. Unregistered annotation types are silently skipped.
    pub fn serialize_annotations(&self, map: &mut MapWriter) -> cbor::Result<()> {
        let registry = REGISTRY.lock().expect("annotation registry lock");
        // Emit in registry key order so the output is deterministic
        let mut present: Vec<&Entry> = registry
            .entries
            .iter()
            .filter(|e| self.annotations.contains_key(&e.type_id))
            .collect();
        present.sort_by(|a, b| a.key.cmp(&b.key));
        for entry in present {
            let value = &self.annotations[&entry.type_id];
            let mut payload = map.append_map(&entry.key)?;
            (entry.serialize)(value.as_ref(), &mut payload)?;
            payload.close()?;
        }
        Ok(())
    }

    /// Reconstructs registered annotations from the incoming map. Entries
    /// whose key is not a registered `{...}` name are ignored.
    pub fn deserialize_annotations(&mut self, map: &MapReader) -> cbor::Result<()> {
        let registry = REGISTRY.lock().expect("annotation registry lock");
        for (key, value) in map.iter() {
            if !(key.starts_with('{') && key.ends_with('}')) {
                continue;
            }
            let Some(&idx) = registry.by_key.get(key) else {
                continue;
            };
            let entry = &registry.entries[idx];
            let payload = value.as_map()?;
            let reconstructed = (entry.deserialize)(&payload)?;
            self.annotations.insert(entry.type_id, reconstructed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Annotatable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Annotatable({} annotations)", self.annotations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::{Reader, Writer};

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        line: i64,
        column: i64,
    }

    fn register_position() {
        register::<Position>(
            "Position",
            |value, map| {
                map.append_int("line", value.line)?;
                map.append_int("column", value.column)
            },
            |map| {
                Ok(Position {
                    line: map.get("line").map_or(Ok(0), |r| r.as_int())?,
                    column: map.get("column").map_or(Ok(0), |r| r.as_int())?,
                })
            },
        );
    }

    #[test]
    fn test_set_get_take() {
        let mut node = Annotatable::new();
        assert!(!node.has_annotation::<Position>());
        node.set_annotation(Position { line: 3, column: 9 });
        assert!(node.has_annotation::<Position>());
        assert_eq!(node.get_annotation::<Position>().unwrap().line, 3);
        let taken = node.take_annotation::<Position>().unwrap();
        assert_eq!(taken.column, 9);
        assert!(!node.has_annotation::<Position>());
    }

    #[test]
    fn test_distinct_types_coexist() {
        struct Weight(f64);
        let mut node = Annotatable::new();
        node.set_annotation(Position { line: 1, column: 1 });
        node.set_annotation(Weight(0.5));
        assert_eq!(node.annotation_count(), 2);
        assert_eq!(node.get_annotation::<Weight>().unwrap().0, 0.5);
    }

    #[test]
    fn test_copy_shares_references() {
        let mut a = Annotatable::new();
        a.set_annotation(Position { line: 7, column: 2 });
        let mut b = Annotatable::new();
        b.copy_annotations_from(&a);
        let from_a = a.get_annotation::<Position>().unwrap();
        let from_b = b.get_annotation::<Position>().unwrap();
        assert!(Rc::ptr_eq(&from_a, &from_b), "copy must share, not clone");
    }

    #[test]
    fn test_serialize_roundtrip() {
        register_position();
        let mut node = Annotatable::new();
        node.set_annotation(Position { line: 11, column: 4 });
        // An unregistered annotation must be skipped silently
        struct Unregistered;
        node.set_annotation(Unregistered);

        let mut writer = Writer::new();
        {
            let mut map = writer.start().unwrap();
            map.append_string("type", "Lit").unwrap();
            node.serialize_annotations(&mut map).unwrap();
            map.close().unwrap();
        }
        let reader = Reader::new(writer.into_bytes()).unwrap();
        let map = reader.as_map().unwrap();
        assert!(map.contains_key("{Position}"));
        assert_eq!(map.len(), 2, "unregistered annotation must not serialize");

        let mut restored = Annotatable::new();
        restored.deserialize_annotations(&map).unwrap();
        let position = restored.get_annotation::<Position>().unwrap();
        assert_eq!(*position, Position { line: 11, column: 4 });
    }

    #[test]
    fn test_deserialize_ignores_unknown_keys() {
        register_position();
        let mut writer = Writer::new();
        {
            let mut map = writer.start().unwrap();
            map.append_string("type", "Lit").unwrap();
            // A {}-shaped key with no registration, and a plain field
            let mut unknown = map.append_map("{NotRegistered}").unwrap();
            unknown.append_int("x", 1).unwrap();
            unknown.close().unwrap();
            map.append_int("value", 3).unwrap();
            map.close().unwrap();
        }
        let reader = Reader::new(writer.into_bytes()).unwrap();
        let map = reader.as_map().unwrap();
        let mut node = Annotatable::new();
        node.deserialize_annotations(&map).unwrap();
        assert_eq!(node.annotation_count(), 0);
    }
}
