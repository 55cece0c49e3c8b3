//! Tree-sitter parsing and lightweight extraction for JS/TS sources.
//!
//! Extraction is static and shallow: import bindings, the export surface,
//! and object keys returned by exported functions. Nothing is executed or
//! type-checked.

use std::cell::RefCell;
use std::collections::BTreeSet;

use tree_sitter::{Node, Parser, Tree};

use crate::core::profile::Candidate;

/// Grammar used for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Dialect {
    pub fn for_path(path: &str) -> Option<Self> {
        match Candidate::new(path, "").extension()?.as_str() {
            "ts" | "mts" | "cts" => Some(Dialect::TypeScript),
            "tsx" | "jsx" => Some(Dialect::Tsx),
            "js" | "mjs" | "cjs" => Some(Dialect::JavaScript),
            _ => None,
        }
    }
}

thread_local! {
    static TS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A grammar/ABI mismatch surfaces as a failed parse below.
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
        p
    });

    static TSX_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into());
        p
    });

    static JS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_javascript::LANGUAGE.into());
        p
    });
}

/// A parsed file and the source it was parsed from.
pub struct ParsedSource<'a> {
    pub path: &'a str,
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }
}

/// Parse `content`, or `None` if the path is not JS/TS or the parser gave up.
pub fn parse<'a>(path: &'a str, content: &'a str) -> Option<ParsedSource<'a>> {
    let tree = match Dialect::for_path(path)? {
        Dialect::TypeScript => TS_PARSER.with(|p| p.borrow_mut().parse(content, None)),
        Dialect::Tsx => TSX_PARSER.with(|p| p.borrow_mut().parse(content, None)),
        Dialect::JavaScript => JS_PARSER.with(|p| p.borrow_mut().parse(content, None)),
    }?;
    Some(ParsedSource {
        path,
        source: content,
        tree,
    })
}

/// Visit every node below (and including) `root` in document order.
pub fn visit<'t>(root: Node<'t>, mut f: impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    loop {
        f(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() || cursor.node() == root {
                return;
            }
        }
    }
}

/// 1-indexed line of `node`.
pub fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// True if `node` has an anonymous child token with this kind (`type`, `default`, `*`).
fn has_token(node: Node<'_>, token: &str) -> bool {
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .any(|child| !child.is_named() && child.kind() == token)
}

fn unquote(text: &str) -> String {
    text.trim_matches(|c| matches!(c, '"' | '\'' | '`')).to_string()
}

/// One local name introduced by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Name used inside the importing file.
    pub local: String,
    /// Name exported by the source module: `default`, `*`, or the export name.
    pub imported: String,
    pub type_only: bool,
}

/// One `import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub source: String,
    pub bindings: Vec<ImportBinding>,
    pub line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl ImportDecl {
    pub fn contains_byte(&self, byte: usize) -> bool {
        (self.start_byte..self.end_byte).contains(&byte)
    }
}

/// All top-level import statements.
pub fn imports(parsed: &ParsedSource<'_>) -> Vec<ImportDecl> {
    let root = parsed.root();
    let mut decls = Vec::new();
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        if stmt.kind() != "import_statement" {
            continue;
        }
        let Some(source) = stmt.child_by_field_name("source") else {
            continue;
        };
        let statement_type_only = has_token(stmt, "type");
        let mut bindings = Vec::new();
        let mut clause_cursor = stmt.walk();
        for clause in stmt.named_children(&mut clause_cursor) {
            if clause.kind() == "import_clause" {
                collect_clause_bindings(parsed, clause, statement_type_only, &mut bindings);
            }
        }
        decls.push(ImportDecl {
            source: unquote(parsed.text(source)),
            bindings,
            line: line_of(stmt),
            start_byte: stmt.start_byte(),
            end_byte: stmt.end_byte(),
        });
    }
    decls
}

fn collect_clause_bindings(
    parsed: &ParsedSource<'_>,
    clause: Node<'_>,
    type_only: bool,
    bindings: &mut Vec<ImportBinding>,
) {
    let mut cursor = clause.walk();
    for part in clause.named_children(&mut cursor) {
        match part.kind() {
            "identifier" => bindings.push(ImportBinding {
                local: parsed.text(part).to_string(),
                imported: "default".to_string(),
                type_only,
            }),
            "namespace_import" => {
                let mut inner = part.walk();
                if let Some(name) = part
                    .named_children(&mut inner)
                    .find(|n| n.kind() == "identifier")
                {
                    bindings.push(ImportBinding {
                        local: parsed.text(name).to_string(),
                        imported: "*".to_string(),
                        type_only,
                    });
                }
            }
            "named_imports" => {
                let mut inner = part.walk();
                for spec in part.named_children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = unquote(parsed.text(name));
                    let local = spec
                        .child_by_field_name("alias")
                        .map(|alias| parsed.text(alias).to_string())
                        .unwrap_or_else(|| imported.clone());
                    bindings.push(ImportBinding {
                        local,
                        imported,
                        type_only: type_only || has_token(spec, "type"),
                    });
                }
            }
            _ => {}
        }
    }
}

/// Names an exported function hands back in an object literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// Every `return` yields an object literal with exactly these keys.
    Keys(BTreeSet<String>),
    /// Returns something else, spreads, or has no return: keys unknown.
    Opaque,
}

/// What a module makes available to importers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSurface {
    pub names: BTreeSet<String>,
    pub has_default: bool,
    /// `export * from ...` makes the surface open-ended.
    pub star_reexport: bool,
    /// Return shapes of exported functions, keyed by export name (`default` included).
    pub returns: Vec<(String, ReturnShape)>,
}

impl ExportSurface {
    pub fn provides(&self, name: &str) -> bool {
        if name == "default" {
            return self.has_default || self.star_reexport;
        }
        self.star_reexport || self.names.contains(name)
    }

    pub fn return_shape(&self, name: &str) -> Option<&ReturnShape> {
        self.returns
            .iter()
            .find(|(export, _)| export == name)
            .map(|(_, shape)| shape)
    }
}

/// Extract the export surface of a module.
pub fn exports(parsed: &ParsedSource<'_>) -> ExportSurface {
    let root = parsed.root();
    let mut surface = ExportSurface::default();
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        if stmt.kind() != "export_statement" {
            continue;
        }
        let is_default = has_token(stmt, "default");
        if is_default {
            surface.has_default = true;
        }
        if has_token(stmt, "*") || has_named_child(stmt, "namespace_export") {
            surface.star_reexport = true;
        }

        if let Some(decl) = stmt.child_by_field_name("declaration") {
            for (name, function) in declared_names(parsed, decl) {
                if let Some(function) = function {
                    let shape = return_shape(parsed, function);
                    if is_default {
                        surface.returns.push(("default".to_string(), shape.clone()));
                    }
                    surface.returns.push((name.clone(), shape));
                }
                if !is_default {
                    surface.names.insert(name);
                }
            }
        } else if let Some(value) = stmt
            .child_by_field_name("value")
            .filter(|value| is_function_like(*value))
        {
            surface
                .returns
                .push(("default".to_string(), return_shape(parsed, value)));
        }

        let mut inner = stmt.walk();
        for clause in stmt.named_children(&mut inner) {
            if clause.kind() != "export_clause" {
                continue;
            }
            let mut spec_cursor = clause.walk();
            for spec in clause.named_children(&mut spec_cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let Some(name) = spec.child_by_field_name("name") else {
                    continue;
                };
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|alias| unquote(parsed.text(alias)))
                    .unwrap_or_else(|| unquote(parsed.text(name)));
                if exported == "default" {
                    surface.has_default = true;
                } else {
                    surface.names.insert(exported);
                }
            }
        }
    }
    surface
}

fn has_named_child(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).any(|child| child.kind() == kind)
}

fn is_function_like(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "arrow_function"
            | "method_definition"
    )
}

/// Names declared by an exported declaration, with the function node when
/// the name is bound to a function.
fn declared_names<'t>(parsed: &ParsedSource<'_>, decl: Node<'t>) -> Vec<(String, Option<Node<'t>>)> {
    match decl.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut names = Vec::new();
            let mut cursor = decl.walk();
            for declarator in decl.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name) = declarator.child_by_field_name("name") else {
                    continue;
                };
                let function = declarator
                    .child_by_field_name("value")
                    .filter(|value| is_function_like(*value));
                if name.kind() == "identifier" {
                    names.push((parsed.text(name).to_string(), function));
                } else {
                    for binding in pattern_names(parsed, name) {
                        names.push((binding, None));
                    }
                }
            }
            names
        }
        _ => decl
            .child_by_field_name("name")
            .map(|name| {
                let function = is_function_like(decl).then_some(decl);
                vec![(parsed.text(name).to_string(), function)]
            })
            .unwrap_or_default(),
    }
}

/// Identifiers bound by a destructuring pattern (`{ a, b: c }` binds `a`, `c`).
fn pattern_names(parsed: &ParsedSource<'_>, pattern: Node<'_>) -> Vec<String> {
    let mut names = Vec::new();
    visit(pattern, |node| {
        if matches!(node.kind(), "identifier" | "shorthand_property_identifier_pattern") {
            let is_key = node
                .parent()
                .and_then(|parent| parent.child_by_field_name("key"))
                .is_some_and(|key| key == node);
            if !is_key {
                names.push(parsed.text(node).to_string());
            }
        }
    });
    names
}

/// Keys of object literals returned by `function`.
pub fn return_shape(parsed: &ParsedSource<'_>, function: Node<'_>) -> ReturnShape {
    let Some(body) = function.child_by_field_name("body") else {
        return ReturnShape::Opaque;
    };
    if body.kind() != "statement_block" {
        return object_keys(parsed, body).map_or(ReturnShape::Opaque, ReturnShape::Keys);
    }

    let mut returns = Vec::new();
    collect_returns(body, &mut returns);
    if returns.is_empty() {
        return ReturnShape::Opaque;
    }
    let mut keys = BTreeSet::new();
    for ret in returns {
        let Some(value) = ret.named_child(0) else {
            return ReturnShape::Opaque;
        };
        match object_keys(parsed, value) {
            Some(found) => keys.extend(found),
            None => return ReturnShape::Opaque,
        }
    }
    ReturnShape::Keys(keys)
}

fn collect_returns<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "return_statement" {
            out.push(child);
        } else if !is_function_like(child) && child.kind() != "class_declaration" {
            collect_returns(child, out);
        }
    }
}

/// Keys of an object literal (through parentheses and `as` casts), or
/// `None` if the node is not a closed object literal.
fn object_keys(parsed: &ParsedSource<'_>, node: Node<'_>) -> Option<BTreeSet<String>> {
    let node = unwrap_expression(node);
    if node.kind() != "object" {
        return None;
    }
    let mut keys = BTreeSet::new();
    let mut cursor = node.walk();
    for member in node.named_children(&mut cursor) {
        match member.kind() {
            "shorthand_property_identifier" => {
                keys.insert(parsed.text(member).to_string());
            }
            "pair" | "method_definition" => {
                let key = member
                    .child_by_field_name("key")
                    .or_else(|| member.child_by_field_name("name"))?;
                if key.kind() == "computed_property_name" {
                    return None;
                }
                keys.insert(unquote(parsed.text(key)));
            }
            "comment" => {}
            _ => return None,
        }
    }
    Some(keys)
}

fn unwrap_expression(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    while matches!(
        current.kind(),
        "parenthesized_expression" | "as_expression" | "satisfies_expression"
    ) {
        match current.named_child(0) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// `const { a, b } = callee(...)` found in a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destructure {
    pub callee: String,
    pub keys: Vec<String>,
    /// A `...rest` element accepts any key set.
    pub has_rest: bool,
    pub line: usize,
}

/// Object destructurings of direct calls (`await` allowed).
pub fn call_destructures(parsed: &ParsedSource<'_>) -> Vec<Destructure> {
    let mut found = Vec::new();
    visit(parsed.root(), |node| {
        if node.kind() != "variable_declarator" {
            return;
        }
        let (Some(pattern), Some(value)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("value"),
        ) else {
            return;
        };
        if pattern.kind() != "object_pattern" {
            return;
        }
        let mut call = unwrap_expression(value);
        if call.kind() == "await_expression" {
            if let Some(inner) = call.named_child(0) {
                call = unwrap_expression(inner);
            }
        }
        if call.kind() != "call_expression" {
            return;
        }
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };
        if function.kind() != "identifier" {
            return;
        }

        let mut keys = Vec::new();
        let mut has_rest = false;
        let mut cursor = pattern.walk();
        for element in pattern.named_children(&mut cursor) {
            match element.kind() {
                "shorthand_property_identifier_pattern" => keys.push(parsed.text(element).to_string()),
                "pair_pattern" => {
                    if let Some(key) = element.child_by_field_name("key") {
                        keys.push(unquote(parsed.text(key)));
                    }
                }
                "object_assignment_pattern" => {
                    if let Some(left) = element.child_by_field_name("left") {
                        keys.push(parsed.text(left).to_string());
                    }
                }
                "rest_pattern" => has_rest = true,
                _ => {}
            }
        }
        found.push(Destructure {
            callee: parsed.text(function).to_string(),
            keys,
            has_rest,
            line: line_of(node),
        });
    });
    found
}
