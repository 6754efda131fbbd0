//! Dynamic-language emitter: produces a single Python module mirroring the
//! generated C++ hierarchy, with CBOR encode/decode helpers matching the
//! native wire format byte for byte.
//!
//! The runtime part (CBOR codec, `Node` base machinery) is emitted as-is at
//! the top of the module; only the class definitions are model-specific.
//! Field algorithms are driven by per-class `_OWN_FIELDS` tables so that the
//! clone/equality/completeness semantics live in one place.

use crate::emit_cpp::snake_case;
use crate::model::*;

/// The fixed runtime support emitted at the top of every generated module.
const RUNTIME: &str = r#"# Generated by tree-gen. Do not edit.

import enum
import struct
import sys


class NotWellFormed(Exception):
    """Raised when a tree fails its completeness or format checks."""


def _cbor_encode(obj, out=None):
    """Encodes a Python object tree into the CBOR subset used by tree-gen:
    indefinite-length maps and arrays, definite-length strings, shortest
    integer encodings, and double-precision floats only."""
    if out is None:
        out = bytearray()
        _cbor_encode(obj, out)
        return bytes(out)
    if obj is None:
        out.append(0xF6)
    elif obj is True:
        out.append(0xF5)
    elif obj is False:
        out.append(0xF4)
    elif isinstance(obj, int):
        if obj < 0:
            _cbor_encode_uint(1, -1 - obj, out)
        else:
            _cbor_encode_uint(0, obj, out)
    elif isinstance(obj, float):
        out.append(0xFB)
        out.extend(struct.pack('>d', obj))
    elif isinstance(obj, str):
        data = obj.encode('utf-8')
        _cbor_encode_uint(3, len(data), out)
        out.extend(data)
    elif isinstance(obj, (bytes, bytearray)):
        _cbor_encode_uint(2, len(obj), out)
        out.extend(obj)
    elif isinstance(obj, (list, tuple)):
        out.append(0x9F)
        for element in obj:
            _cbor_encode(element, out)
        out.append(0xFF)
    elif isinstance(obj, dict):
        out.append(0xBF)
        for key, value in obj.items():
            if not isinstance(key, str):
                raise TypeError('map keys must be strings')
            _cbor_encode(key, out)
            _cbor_encode(value, out)
        out.append(0xFF)
    else:
        raise TypeError('cannot encode %r' % (type(obj).__name__,))
    return out


def _cbor_encode_uint(major, value, out):
    if value >= 1 << 64:
        raise ValueError('integer too large for CBOR')
    head = major << 5
    if value < 24:
        out.append(head | value)
    elif value < 0x100:
        out.append(head | 24)
        out.append(value)
    elif value < 0x10000:
        out.append(head | 25)
        out.extend(value.to_bytes(2, 'big'))
    elif value < 0x100000000:
        out.append(head | 26)
        out.extend(value.to_bytes(4, 'big'))
    else:
        out.append(head | 27)
        out.extend(value.to_bytes(8, 'big'))


def _cbor_decode(data):
    """Decodes CBOR bytes into a Python object tree, enforcing the same
    subset restrictions as the native reader."""
    obj, offset = _cbor_decode_at(memoryview(data), 0)
    if offset != len(data):
        raise NotWellFormed(
            'invalid CBOR: garbage at end of outer object or multiple objects')
    return obj


def _cbor_read_uint(data, info, offset):
    if info < 24:
        return info, offset
    if info >= 28:
        raise NotWellFormed(
            'invalid CBOR: illegal additional info for integer or object length')
    width = 1 << (info - 24)
    if offset + width > len(data):
        raise NotWellFormed('invalid CBOR: truncated integer')
    return int.from_bytes(data[offset:offset + width], 'big'), offset + width


def _cbor_decode_at(data, offset):
    if offset >= len(data):
        raise NotWellFormed('invalid CBOR: truncated object')
    initial = data[offset]
    offset += 1
    major = initial >> 5
    info = initial & 0x1F
    if major == 0:
        value, offset = _cbor_read_uint(data, info, offset)
        if value >= 1 << 63:
            raise NotWellFormed('CBOR integer out of int64 range')
        return value, offset
    if major == 1:
        value, offset = _cbor_read_uint(data, info, offset)
        if value >= 1 << 63:
            raise NotWellFormed('CBOR integer out of int64 range')
        return -1 - value, offset
    if major in (2, 3):
        chunks = bytearray()
        if info == 31:
            while data[offset] != 0xFF:
                sub = data[offset]
                if sub >> 5 != major or sub & 0x1F == 31:
                    raise NotWellFormed(
                        'invalid CBOR: illegal indefinite-length string component')
                length, new_offset = _cbor_read_uint(data, sub & 0x1F, offset + 1)
                chunks.extend(data[new_offset:new_offset + length])
                offset = new_offset + length
            offset += 1
        else:
            length, offset = _cbor_read_uint(data, info, offset)
            if offset + length > len(data):
                raise NotWellFormed('invalid CBOR: string read past end of slice')
            chunks.extend(data[offset:offset + length])
            offset += length
        if major == 3:
            return chunks.decode('utf-8'), offset
        return bytes(chunks), offset
    if major == 4:
        items = []
        if info == 31:
            while data[offset] != 0xFF:
                value, offset = _cbor_decode_at(data, offset)
                items.append(value)
            offset += 1
        else:
            count, offset = _cbor_read_uint(data, info, offset)
            for _ in range(count):
                value, offset = _cbor_decode_at(data, offset)
                items.append(value)
        return items, offset
    if major == 5:
        mapping = {}
        if info == 31:
            while data[offset] != 0xFF:
                key, offset = _cbor_decode_at(data, offset)
                value, offset = _cbor_decode_at(data, offset)
                if not isinstance(key, str):
                    raise NotWellFormed('invalid CBOR: map keys must be UTF8 strings')
                mapping[key] = value
            offset += 1
        else:
            count, offset = _cbor_read_uint(data, info, offset)
            for _ in range(count):
                key, offset = _cbor_decode_at(data, offset)
                value, offset = _cbor_decode_at(data, offset)
                if not isinstance(key, str):
                    raise NotWellFormed('invalid CBOR: map keys must be UTF8 strings')
                mapping[key] = value
        return mapping, offset
    if major == 6:
        # Semantic tags carry no meaning here; skip transparently.
        _, offset = _cbor_read_uint(data, info, offset)
        return _cbor_decode_at(data, offset)
    if info in (20, 21):
        return info == 21, offset
    if info == 22:
        return None, offset
    if info == 23:
        raise NotWellFormed('invalid CBOR: undefined value is not supported')
    if info == 25:
        raise NotWellFormed('invalid CBOR: half-precision float is not supported')
    if info == 26:
        raise NotWellFormed('invalid CBOR: single-precision float is not supported')
    if info == 27:
        if offset + 8 > len(data):
            raise NotWellFormed('invalid CBOR: truncated float')
        return struct.unpack('>d', data[offset:offset + 8])[0], offset + 8
    if info == 31:
        raise NotWellFormed('invalid CBOR: unexpected break')
    raise NotWellFormed('invalid CBOR: unknown type code')


class Node:
    """Common base of all generated node classes."""

    _TYPE_NAME = None
    _TYPE_ID = 0
    _OWN_FIELDS = ()

    def __init__(self):
        self.annotations = {}
        self.location = None

    @classmethod
    def _all_fields(cls):
        fields = []
        for klass in reversed(cls.__mro__):
            fields.extend(klass.__dict__.get('_OWN_FIELDS', ()))
        return fields

    def copy(self):
        """Shallow clone: owning children are shared, not duplicated."""
        node = type(self)()
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Any', 'Many'):
                setattr(node, name, list(value))
            else:
                setattr(node, name, value)
        node.location = self.location
        node.annotations = dict(self.annotations)
        return node

    def clone(self):
        """Deep clone of the owning subtree. Links are remapped when their
        target was cloned in the same operation."""
        memo = {}
        node = self._clone_into(memo)
        node._restore_links(memo)
        return node

    def _clone_into(self, memo):
        node = type(self)()
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                if value is not None:
                    setattr(node, name, value._clone_into(memo))
            elif kind in ('Any', 'Many'):
                setattr(node, name, [el._clone_into(memo) for el in value])
            else:
                setattr(node, name, value)
        node.location = self.location
        node.annotations = dict(self.annotations)
        memo[id(self)] = node
        return node

    def _restore_links(self, memo):
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                if value is not None:
                    value._restore_links(memo)
            elif kind in ('Any', 'Many'):
                for el in value:
                    el._restore_links(memo)
            elif kind == 'Link':
                if value is not None and id(value) in memo:
                    setattr(self, name, memo[id(value)])

    def __eq__(self, other):
        if type(self) is not type(other):
            return NotImplemented if not isinstance(other, Node) else False
        for name, kind, _target in self._all_fields():
            mine = getattr(self, name)
            theirs = getattr(other, name)
            if kind == 'Link':
                if mine is not theirs:
                    return False
            elif kind in ('Any', 'Many'):
                if len(mine) != len(theirs):
                    return False
                if any(a != b for a, b in zip(mine, theirs)):
                    return False
            else:
                if mine != theirs:
                    return False
        return True

    __hash__ = None

    def check_complete(self):
        """Verifies One fields are filled, Many fields are non-empty, and
        links resolve inside this tree. Raises NotWellFormed otherwise."""
        reachable = set()
        self._collect_reachable(reachable)
        self._check_complete_with(reachable)

    def _collect_reachable(self, reachable):
        reachable.add(id(self))
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                if value is not None:
                    value._collect_reachable(reachable)
            elif kind in ('Any', 'Many'):
                for el in value:
                    el._collect_reachable(reachable)

    def _check_complete_with(self, reachable):
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind == 'One':
                if value is None:
                    raise NotWellFormed(
                        "'One' field %r of %r is empty"
                        % (name, type(self).__name__))
                value._check_complete_with(reachable)
            elif kind == 'Maybe':
                if value is not None:
                    value._check_complete_with(reachable)
            elif kind == 'Many':
                if not value:
                    raise NotWellFormed(
                        "'Many' field %r of %r is empty"
                        % (name, type(self).__name__))
                for el in value:
                    el._check_complete_with(reachable)
            elif kind == 'Any':
                for el in value:
                    el._check_complete_with(reachable)
            elif kind == 'Link':
                if value is not None and id(value) not in reachable:
                    raise NotWellFormed(
                        "link %r of %r does not resolve within this tree"
                        % (name, type(self).__name__))

    def dump(self, file=sys.stdout, indent=0):
        pad = ' ' * indent
        file.write('%s%s {\n' % (pad, type(self).__name__))
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                file.write('%s  %s:\n' % (pad, name))
                if value is None:
                    file.write('%s    null\n' % (pad,))
                else:
                    value.dump(file, indent + 4)
            elif kind in ('Any', 'Many'):
                file.write('%s  %s: [\n' % (pad, name))
                for el in value:
                    el.dump(file, indent + 4)
                file.write('%s  ]\n' % (pad,))
            elif kind == 'Link':
                file.write('%s  %s: %s\n'
                           % (pad, name, '<link>' if value is not None else 'null'))
            else:
                file.write('%s  %s: %r\n' % (pad, name, value))
        file.write('%s}\n' % (pad,))

    def serialize(self):
        """Serializes this tree into CBOR bytes per the shared wire format."""
        ids = {}
        order = []
        self._assign_link_ids(ids, order)
        mapping = self._to_map(ids)
        if order:
            links = []
            for target in order:
                path = []
                if self._find_path(target, path):
                    links.append(list(path))
                else:
                    links.append(None)
            mapping['links'] = links
        return _cbor_encode(mapping)

    def _assign_link_ids(self, ids, order):
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                if value is not None:
                    value._assign_link_ids(ids, order)
            elif kind in ('Any', 'Many'):
                for el in value:
                    el._assign_link_ids(ids, order)
            elif kind == 'Link':
                if value is not None and id(value) not in ids:
                    ids[id(value)] = len(order)
                    order.append(value)

    def _find_path(self, target, path):
        if target is self:
            return True
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                if value is not None:
                    path.append(name)
                    if value._find_path(target, path):
                        return True
                    path.pop()
            elif kind in ('Any', 'Many'):
                for i, el in enumerate(value):
                    path.append(name)
                    path.append(i)
                    if el._find_path(target, path):
                        return True
                    path.pop()
                    path.pop()
        return False

    def _to_map(self, ids):
        mapping = {'type': self._TYPE_NAME}
        for name, kind, _target in self._all_fields():
            value = getattr(self, name)
            if kind in ('Maybe', 'One'):
                mapping[name] = None if value is None else value._to_map(ids)
            elif kind in ('Any', 'Many'):
                mapping[name] = [el._to_map(ids) for el in value]
            elif kind == 'Link':
                mapping[name] = None if value is None else ids[id(value)]
            elif kind == 'Enum':
                mapping[name] = int(value)
            else:
                mapping[name] = value
        if self.location is not None:
            mapping['location'] = self.location
        for key, payload in self.annotations.items():
            mapping[key] = payload
        return mapping

    @staticmethod
    def deserialize(data):
        """Reconstructs a tree from CBOR bytes produced by either emitter."""
        mapping = _cbor_decode(data)
        fixups = []
        node = Node._from_map(mapping, fixups)
        links = mapping.get('links') or []
        for link_id, setter in fixups:
            path = links[link_id] if 0 <= link_id < len(links) else None
            if path is not None:
                setter(node._walk_path(path))
        return node

    @staticmethod
    def _from_map(mapping, fixups):
        cls = _NODE_TYPES.get(mapping.get('type'))
        if cls is None:
            raise NotWellFormed('unknown node type %r' % (mapping.get('type'),))
        node = cls()
        for name, kind, _target in node._all_fields():
            if name not in mapping:
                continue
            value = mapping[name]
            if kind in ('Maybe', 'One'):
                if value is not None:
                    setattr(node, name, Node._from_map(value, fixups))
            elif kind in ('Any', 'Many'):
                setattr(node, name,
                        [Node._from_map(el, fixups) for el in value])
            elif kind == 'Link':
                if value is not None:
                    fixups.append(
                        (value,
                         lambda t, _node=node, _name=name: setattr(_node, _name, t)))
            else:
                setattr(node, name, value)
        if 'location' in mapping:
            node.location = mapping['location']
        for key, payload in mapping.items():
            if key.startswith('{') and key.endswith('}'):
                node.annotations[key] = payload
        return node

    def _walk_path(self, path):
        node = self
        i = 0
        while i < len(path):
            name = path[i]
            i += 1
            index = None
            if i < len(path) and isinstance(path[i], int):
                index = path[i]
                i += 1
            value = getattr(node, name)
            node = value[index] if index is not None else value
        return node
"#;

/// Emit the Python mirror module for the model.
pub fn emit(model: &TreeModel) -> String {
    let mut out: Vec<String> = Vec::new();
    out.push(RUNTIME.trim_end().to_string());
    out.push(String::new());
    out.push(String::new());

    for enumeration in &model.enums {
        emit_enum(&mut out, enumeration);
    }
    for idx in 0..model.nodes.len() {
        emit_class(&mut out, model, idx);
    }
    emit_visitor(&mut out, model);
    emit_type_table(&mut out, model);

    out.join("\n") + "\n"
}

fn emit_enum(out: &mut Vec<String>, enumeration: &Enumeration) {
    out.push(format!("class {}(enum.IntEnum):", enumeration.name));
    if let Some(doc) = &enumeration.doc {
        out.push(format!("    \"\"\"{}\"\"\"", doc.replace('\n', " ")));
        out.push(String::new());
    }
    for (ordinal, constant) in enumeration.constants.iter().enumerate() {
        out.push(format!("    {} = {}", constant, ordinal));
    }
    out.push(String::new());
    out.push(String::new());
}

/// The `(name, kind, target)` metadata row for a field.
fn field_row(model: &TreeModel, field: &Field) -> String {
    let kind = match (field.kind, field.target) {
        (EdgeKind::Maybe, _) => "Maybe",
        (EdgeKind::One, _) => "One",
        (EdgeKind::Any, _) => "Any",
        (EdgeKind::Many, _) => "Many",
        (EdgeKind::Link, _) => "Link",
        (EdgeKind::Prim, TypeRef::Enum(_)) => "Enum",
        (EdgeKind::Prim, _) => "Prim",
    };
    format!(
        "('{}', '{}', '{}')",
        field.name,
        kind,
        model.target_name(field.target)
    )
}

fn emit_class(out: &mut Vec<String>, model: &TreeModel, idx: usize) {
    let node = &model.nodes[idx];
    let parent = match node.parent {
        Some(p) => model.nodes[p].name.clone(),
        None => "Node".to_string(),
    };
    let all_fields = model.all_fields(idx);

    out.push(format!("class {}({}):", node.name, parent));
    if let Some(doc) = &node.doc {
        if doc.lines().count() <= 1 {
            out.push(format!("    \"\"\"{}\"\"\"", doc));
        } else {
            out.push("    \"\"\"".to_string());
            for line in doc.lines() {
                out.push(format!("    {}", line));
            }
            out.push("    \"\"\"".to_string());
        }
        out.push(String::new());
    }

    out.push(format!("    _TYPE_NAME = '{}'", node.name));
    out.push(format!("    _TYPE_ID = {}", node.type_id));
    if node.fields.is_empty() {
        out.push("    _OWN_FIELDS = ()".to_string());
    } else {
        out.push("    _OWN_FIELDS = (".to_string());
        for field in &node.fields {
            out.push(format!("        {},", field_row(model, field)));
        }
        out.push("    )".to_string());
    }
    out.push(String::new());

    // Constructor: every visible field in declaration order, inherited first.
    let params: Vec<String> = all_fields
        .iter()
        .map(|(_, f)| match f.kind {
            EdgeKind::Any | EdgeKind::Many => format!("{}=()", f.name),
            _ => format!("{}=None", f.name),
        })
        .collect();
    if params.is_empty() {
        out.push("    def __init__(self):".to_string());
        out.push("        super().__init__()".to_string());
    } else {
        out.push(format!("    def __init__(self, {}):", params.join(", ")));
        let inherited: Vec<&str> = all_fields
            .iter()
            .filter(|(owner, _)| *owner != idx)
            .map(|(_, f)| f.name.as_str())
            .collect();
        if inherited.is_empty() {
            out.push("        super().__init__()".to_string());
        } else {
            out.push(format!("        super().__init__({})", inherited.join(", ")));
        }
        for field in &node.fields {
            out.push(format!("        self.{0} = {0}", field.name));
        }
    }
    out.push(String::new());

    // Runtime-checked properties for the node's own fields.
    for field in &node.fields {
        emit_property(out, model, node, field);
    }

    if node.is_concrete() {
        out.push("    def visit(self, visitor):".to_string());
        out.push(format!(
            "        visitor.visit_{}(self)",
            snake_case(&node.name)
        ));
        out.push(String::new());
    }
    out.push(String::new());
}

fn emit_property(out: &mut Vec<String>, model: &TreeModel, node: &NodeType, field: &Field) {
    let name = &field.name;
    let target = model.target_name(field.target);
    out.push("    @property".to_string());
    out.push(format!("    def {}(self):", name));
    if let Some(doc) = &field.doc {
        out.push(format!("        \"\"\"{}\"\"\"", doc.replace('\n', " ")));
    }
    out.push(format!("        return self._{}", name));
    out.push(String::new());
    out.push(format!("    @{}.setter", name));
    out.push(format!("    def {}(self, value):", name));
    match field.kind {
        EdgeKind::Maybe | EdgeKind::One | EdgeKind::Link => {
            out.push(format!(
                "        if value is not None and not isinstance(value, {}):",
                target
            ));
            out.push(format!(
                "            raise TypeError('{} of {} must be a {} or None')",
                name, node.name, target
            ));
            out.push(format!("        self._{} = value", name));
        }
        EdgeKind::Any | EdgeKind::Many => {
            out.push("        value = list(value)".to_string());
            out.push(format!(
                "        if any(not isinstance(el, {}) for el in value):",
                target
            ));
            out.push(format!(
                "            raise TypeError('{} of {} must contain {} nodes')",
                name, node.name, target
            ));
            out.push(format!("        self._{} = value", name));
        }
        EdgeKind::Prim => match field.target {
            TypeRef::Enum(_) => {
                out.push(format!(
                    "        self._{} = {}(0) if value is None else {}(value)",
                    name, target, target
                ));
            }
            TypeRef::Prim(i) => match &model.prims[i].python {
                Some(ctor) => {
                    out.push(format!(
                        "        self._{} = {}() if value is None else {}(value)",
                        name, ctor, ctor
                    ));
                }
                None => {
                    out.push(format!("        self._{} = value", name));
                }
            },
            TypeRef::Node(_) => unreachable!("prim edge cannot target a node"),
        },
    }
    out.push(String::new());
}

fn emit_visitor(out: &mut Vec<String>, model: &TreeModel) {
    out.push("class Visitor:".to_string());
    out.push("    \"\"\"Visitor over the node hierarchy. Each handler falls back to".to_string());
    out.push("    the handler of the node's parent type; the chain ends in".to_string());
    out.push("    visit_node, which raises.\"\"\"".to_string());
    out.push(String::new());
    out.push("    def visit_node(self, node):".to_string());
    out.push("        raise NotImplementedError(".to_string());
    out.push("            'no visitor handler for node type %r'".to_string());
    out.push("            % (type(node).__name__,))".to_string());
    out.push(String::new());
    for node in &model.nodes {
        let fallback = match node.parent {
            Some(p) => format!("visit_{}", snake_case(&model.nodes[p].name)),
            None => "visit_node".to_string(),
        };
        out.push(format!("    def visit_{}(self, node):", snake_case(&node.name)));
        out.push(format!("        self.{}(node)", fallback));
        out.push(String::new());
    }
    out.push(String::new());
}

fn emit_type_table(out: &mut Vec<String>, model: &TreeModel) {
    out.push("_NODE_TYPES = {".to_string());
    for (_, node) in model.concrete_nodes() {
        out.push(format!("    '{0}': {0},", node.name));
    }
    out.push("}".to_string());
}
