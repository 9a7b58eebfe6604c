// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Expression debug tree
//!
//! The tree mirrors the expression as the analyzer walks it: every node
//! records its kind, a display name, its arguments in encounter order and
//! the type the analyzer inferred for it. [`DebugTreeBuilder`] keeps the
//! nodes in an arena and tracks the open calls on an explicit stack.

use serde::Serialize;
use std::fmt;

/// Structural kind of a debug tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpressionKind {
    /// Literal value
    ConstantExpression,
    /// Function call or operator
    FunctionCallExpression,
    /// Property navigation
    ChildExpression,
    /// `%variable` reference
    VariableRefExpression,
    /// `$this`, `$index`, `$total` or the implicit focus
    AxisExpression,
    /// Empty collection literal `{}`
    NewNodeListInitExpression,
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConstantExpression => "ConstantExpression",
            Self::FunctionCallExpression => "FunctionCallExpression",
            Self::ChildExpression => "ChildExpression",
            Self::VariableRefExpression => "VariableRefExpression",
            Self::AxisExpression => "AxisExpression",
            Self::NewNodeListInitExpression => "NewNodeListInitExpression",
        };
        f.write_str(name)
    }
}

/// Finished debug tree node, serialized with PascalCase keys
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebugTreeNode {
    /// Node kind
    pub expression_type: ExpressionKind,
    /// Display name
    pub name: String,
    /// Argument nodes in encounter order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<DebugTreeNode>,
    /// Inferred return type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

impl DebugTreeNode {
    /// Indented text dump, one `name : type` line per node
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.name);
        if let Some(return_type) = &self.return_type {
            out.push_str(" : ");
            out.push_str(return_type);
        }
        out.push('\n');
        for argument in &self.arguments {
            argument.dump_into(out, depth + 1);
        }
    }
}

#[derive(Debug)]
struct ArenaNode {
    kind: ExpressionKind,
    name: String,
    arguments: Vec<usize>,
    return_type: Option<String>,
}

/// Handle of a node in the builder arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// Stack-based builder for [`DebugTreeNode`]s
///
/// Calls are opened with [`begin_call`](Self::begin_call) and closed with
/// [`end_call`](Self::end_call); the outermost frame is never popped so it
/// remains available to [`finish`](Self::finish). Leaves attach to the top
/// frame, or become the root when no frame is open.
#[derive(Debug, Default)]
pub struct DebugTreeBuilder {
    arena: Vec<ArenaNode>,
    stack: Vec<usize>,
    root: Option<usize>,
}

impl DebugTreeBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, kind: ExpressionKind, name: impl Into<String>) -> usize {
        let id = self.arena.len();
        self.arena.push(ArenaNode {
            kind,
            name: name.into(),
            arguments: Vec::new(),
            return_type: None,
        });
        match self.stack.last() {
            Some(&top) => self.arena[top].arguments.push(id),
            None => {
                if self.root.is_none() {
                    self.root = Some(id);
                }
            }
        }
        id
    }

    /// Open a call-like node; its arguments are the nodes created until
    /// the matching [`end_call`](Self::end_call)
    pub fn begin_call(&mut self, kind: ExpressionKind, name: impl Into<String>) -> NodeId {
        let id = self.allocate(kind, name);
        self.stack.push(id);
        NodeId(id)
    }

    /// Close a call-like node and record its type
    pub fn end_call(&mut self, id: NodeId, return_type: impl Into<String>) {
        self.set_type(id.0, return_type.into());
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Add a node without arguments
    pub fn leaf(
        &mut self,
        kind: ExpressionKind,
        name: impl Into<String>,
        return_type: impl Into<String>,
    ) -> NodeId {
        let id = self.allocate(kind, name);
        self.set_type(id, return_type.into());
        NodeId(id)
    }

    fn set_type(&mut self, id: usize, return_type: String) {
        if let Some(node) = self.arena.get_mut(id) {
            node.return_type = (!return_type.is_empty()).then_some(return_type);
        }
    }

    /// Build the finished tree
    pub fn finish(self) -> Option<DebugTreeNode> {
        let root = self.root?;
        Some(self.build(root))
    }

    fn build(&self, id: usize) -> DebugTreeNode {
        let node = &self.arena[id];
        DebugTreeNode {
            expression_type: node.kind,
            name: node.name.clone(),
            arguments: node.arguments.iter().map(|&arg| self.build(arg)).collect(),
            return_type: node.return_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_nested_calls() {
        let mut builder = DebugTreeBuilder::new();
        let outer = builder.begin_call(ExpressionKind::FunctionCallExpression, "count");
        let child = builder.begin_call(ExpressionKind::ChildExpression, "name");
        builder.leaf(ExpressionKind::AxisExpression, "that", "Patient");
        builder.end_call(child, "HumanName[]");
        builder.end_call(outer, "integer");

        let tree = builder.finish().unwrap();
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "ExpressionType": "FunctionCallExpression",
                "Name": "count",
                "Arguments": [{
                    "ExpressionType": "ChildExpression",
                    "Name": "name",
                    "Arguments": [{
                        "ExpressionType": "AxisExpression",
                        "Name": "that",
                        "ReturnType": "Patient"
                    }],
                    "ReturnType": "HumanName[]"
                }],
                "ReturnType": "integer"
            })
        );
        assert_eq!(
            tree.dump(),
            "count : integer\n  name : HumanName[]\n    that : Patient\n"
        );
    }

    #[test]
    fn test_single_leaf_becomes_root() {
        let mut builder = DebugTreeBuilder::new();
        builder.leaf(ExpressionKind::ConstantExpression, "1", "integer");
        let tree = builder.finish().unwrap();
        assert_eq!(tree.name, "1");
        assert!(tree.arguments.is_empty());
    }

    #[test]
    fn test_empty_builder() {
        assert!(DebugTreeBuilder::new().finish().is_none());
    }
}
