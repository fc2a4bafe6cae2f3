use crate::errors::ToolError;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};

const LOCAL_DEFINITIONS: &str = "#/definitions/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefMode {
    /// Replace references with their targets; only cycles are hoisted.
    Inline,
    /// Hoist every referenced fragment into the root `definitions`.
    Collect,
}

/// Rewrites `$ref` pointers of one document into a self-contained form.
///
/// Inline expansion tracks the pointers currently being expanded. A reference
/// to a pointer already on that stack is a cycle: the target is hoisted under
/// `definitions` once and every later occurrence becomes a local reference.
/// Local `#/definitions/...` references are left as they are, so running the
/// resolver over its own output changes nothing.
pub struct SchemaResolver<'a> {
    root: &'a Value,
    mode: RefMode,
    hoisted: HashMap<String, String>,
    taken: HashSet<String>,
    definitions: Map<String, Value>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(root: &'a Value, mode: RefMode) -> Self {
        let taken = root
            .get("definitions")
            .and_then(|v| v.as_object())
            .map(|defs| defs.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            root,
            mode,
            hoisted: HashMap::new(),
            taken,
            definitions: Map::new(),
        }
    }

    /// Rewrites the whole document and merges hoisted fragments into its
    /// top-level `definitions`.
    pub fn resolve(mut self) -> Result<Value, ToolError> {
        let root = self.root;
        let Some(object) = root.as_object() else {
            return self.rewrite(root, &mut Vec::new());
        };

        let mut out = Map::new();
        for (key, value) in object.iter() {
            if key == "definitions" {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let rewritten = self.rewrite(value, &mut Vec::new())?;
            out.insert(key.clone(), rewritten);
        }

        if !self.definitions.is_empty() {
            let entry = out
                .entry("definitions")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(defs) = entry {
                defs.extend(std::mem::take(&mut self.definitions));
            }
        }
        Ok(Value::Object(out))
    }

    fn rewrite(&mut self, node: &'a Value, stack: &mut Vec<String>) -> Result<Value, ToolError> {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(pointer)) = map.get("$ref") {
                    return self.follow(pointer, stack);
                }
                let mut out = Map::new();
                for (key, value) in map.iter() {
                    out.insert(key.clone(), self.rewrite(value, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.rewrite(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn follow(&mut self, pointer: &str, stack: &mut Vec<String>) -> Result<Value, ToolError> {
        if pointer.starts_with(LOCAL_DEFINITIONS) {
            return Ok(local_ref(pointer.trim_start_matches(LOCAL_DEFINITIONS)));
        }
        if self.mode == RefMode::Collect || stack.iter().any(|p| p == pointer) {
            let name = self.hoist(pointer)?;
            return Ok(local_ref(&name));
        }

        let target = self.lookup(pointer)?;
        stack.push(pointer.to_string());
        let expanded = self.rewrite(target, stack);
        stack.pop();
        expanded
    }

    fn hoist(&mut self, pointer: &str) -> Result<String, ToolError> {
        if let Some(name) = self.hoisted.get(pointer) {
            return Ok(name.clone());
        }
        let target = self.lookup(pointer)?;
        let name = self.allocate_name(pointer);
        // Registered before expansion so self-references terminate.
        self.hoisted.insert(pointer.to_string(), name.clone());

        let mut stack = vec![pointer.to_string()];
        let body = self.rewrite(target, &mut stack)?;
        self.definitions.insert(name.clone(), body);
        Ok(name)
    }

    fn lookup(&self, pointer: &str) -> Result<&'a Value, ToolError> {
        let Some(local) = pointer.strip_prefix('#') else {
            return Err(ToolError::spec_malformed(format!(
                "External $ref {} is not supported",
                pointer
            )));
        };
        self.root
            .pointer(local)
            .ok_or_else(|| ToolError::spec_malformed(format!("Unresolved $ref {}", pointer)))
    }

    fn allocate_name(&mut self, pointer: &str) -> String {
        let segment = pointer.rsplit('/').next().unwrap_or_default();
        let segment = segment.replace("~1", "/").replace("~0", "~");
        let mut base: String = segment
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if base.is_empty() {
            base.push_str("root");
        }

        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

fn local_ref(name: &str) -> Value {
    let mut map = Map::new();
    map.insert(
        "$ref".to_string(),
        Value::String(format!("{}{}", LOCAL_DEFINITIONS, name)),
    );
    Value::Object(map)
}

/// Inline-expands every reference of `document`.
pub fn resolve_refs(document: &Value) -> Result<Value, ToolError> {
    SchemaResolver::new(document, RefMode::Inline).resolve()
}

/// Hoists every referenced fragment of `document` into `definitions`.
pub fn collect_refs(document: &Value) -> Result<Value, ToolError> {
    SchemaResolver::new(document, RefMode::Collect).resolve()
}

/// Returns the `definitions` entries `fragment` transitively references.
pub fn hoist_definitions(
    fragment: &Value,
    table: &Map<String, Value>,
) -> Result<Map<String, Value>, ToolError> {
    let mut out = Map::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    collect_local_names(fragment, &mut queue);

    while let Some(name) = queue.pop_front() {
        if out.contains_key(&name) {
            continue;
        }
        let body = table.get(&name).ok_or_else(|| {
            ToolError::spec_malformed(format!("Unresolved $ref {}{}", LOCAL_DEFINITIONS, name))
        })?;
        collect_local_names(body, &mut queue);
        out.insert(name, body.clone());
    }
    Ok(out)
}

fn collect_local_names(node: &Value, out: &mut VecDeque<String>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get("$ref") {
                if let Some(name) = pointer.strip_prefix(LOCAL_DEFINITIONS) {
                    out.push_back(name.replace("~1", "/").replace("~0", "~"));
                }
            }
            for value in map.values() {
                collect_local_names(value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_local_names(item, out);
            }
        }
        _ => {}
    }
}
