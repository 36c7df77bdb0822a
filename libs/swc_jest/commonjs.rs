// Copyright 2018-2026 the Deno authors. MIT license.

//! Rewrites an emitted ES module into a CommonJS module.
//!
//! The rewrite is a set of text changes over the emitted JavaScript. Every
//! change keeps the number of lines of the text it replaces, so each line of
//! the module body stays where the emitter put it and the emitter's source
//! map only needs to account for the lines added in front of the body.

use std::ops::Range;

use deno_ast::ParsedSource;
use deno_ast::ProgramRef;
use deno_ast::StartSourcePos;
use deno_ast::SourceRangedForSpanned;
use deno_ast::TextChange;
use deno_ast::swc::ast::CallExpr;
use deno_ast::swc::ast::Callee;
use deno_ast::swc::ast::Decl;
use deno_ast::swc::ast::DefaultDecl;
use deno_ast::swc::ast::ExportSpecifier;
use deno_ast::swc::ast::Expr;
use deno_ast::swc::ast::ImportSpecifier;
use deno_ast::swc::ast::MemberProp;
use deno_ast::swc::ast::ModuleDecl;
use deno_ast::swc::ast::ModuleExportName;
use deno_ast::swc::ast::ModuleItem;
use deno_ast::swc::ast::ObjectPatProp;
use deno_ast::swc::ast::Pat;
use deno_ast::swc::ast::Stmt;
use deno_ast::swc::ecma_visit::Visit;
use deno_ast::swc::ecma_visit::VisitWith;
use deno_ast::swc::ecma_visit::noop_visit_type;

/// `jest` calls that run before the module's imports are required.
const HOISTED_JEST_METHODS: &[&str] = &[
  "deepUnmock",
  "disableAutomock",
  "enableAutomock",
  "mock",
  "unmock",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonJsModule {
  pub text: String,
  /// Lines inserted in front of the original module body.
  pub prepended_lines: usize,
}

/// Converts the imports and exports of `parsed` into `require` calls and
/// assignments to `exports`. When `hoist_jest_calls` is set, top level
/// `jest.mock(..)` style statements are moved in front of every `require`.
pub fn rewrite_to_commonjs(
  parsed: &ParsedSource,
  hoist_jest_calls: bool,
) -> CommonJsModule {
  let text_info = parsed.text_info_lazy();
  let mut rewriter = CommonJsRewriter {
    text: text_info.text_str(),
    start: text_info.range().start,
    changes: Vec::new(),
    head: Vec::new(),
    hoisted: Vec::new(),
    tail: Vec::new(),
    has_exports: false,
    next_binding_id: 0,
  };
  match parsed.program_ref() {
    ProgramRef::Module(module) => {
      for item in &module.body {
        rewriter.rewrite_item(item, hoist_jest_calls);
      }
    }
    ProgramRef::Script(script) => script.visit_with(&mut rewriter),
  }
  rewriter.finish()
}

struct CommonJsRewriter<'a> {
  text: &'a str,
  start: StartSourcePos,
  changes: Vec<TextChange>,
  head: Vec<String>,
  hoisted: Vec<String>,
  tail: Vec<String>,
  has_exports: bool,
  next_binding_id: usize,
}

impl<'a> CommonJsRewriter<'a> {
  fn byte_range(&self, node: &impl SourceRangedForSpanned) -> Range<usize> {
    node.range().as_byte_range(self.start)
  }

  fn slice(&self, node: &impl SourceRangedForSpanned) -> &'a str {
    &self.text[self.byte_range(node)]
  }

  fn next_binding(&mut self) -> String {
    let binding = format!("_cjs_import_{}", self.next_binding_id);
    self.next_binding_id += 1;
    binding
  }

  /// `.name`, or `["name"]` for string export names.
  fn property_access(&self, name: &ModuleExportName) -> String {
    match name {
      ModuleExportName::Ident(ident) => format!(".{}", ident.sym),
      ModuleExportName::Str(_) => format!("[{}]", self.slice(name)),
    }
  }

  fn replace(&mut self, range: Range<usize>, mut new_text: String) {
    let removed = self.text[range.clone()].matches('\n').count();
    let added = new_text.matches('\n').count();
    for _ in added..removed {
      new_text.push('\n');
    }
    self.changes.push(TextChange { range, new_text });
  }

  fn blank(&mut self, range: Range<usize>) {
    let new_text = self.text[range.clone()]
      .chars()
      .map(|c| if c == '\n' || c == '\r' { c } else { ' ' })
      .collect();
    self.changes.push(TextChange { range, new_text });
  }

  fn insert(&mut self, position: usize, new_text: String) {
    self.changes.push(TextChange {
      range: position..position,
      new_text,
    });
  }

  fn rewrite_item(&mut self, item: &ModuleItem, hoist_jest_calls: bool) {
    match item {
      ModuleItem::ModuleDecl(decl) => self.rewrite_module_decl(decl),
      ModuleItem::Stmt(stmt)
        if hoist_jest_calls && is_hoisted_jest_call(stmt) =>
      {
        let range = self.byte_range(stmt);
        self.hoisted.push(self.text[range.clone()].to_string());
        self.blank(range);
      }
      ModuleItem::Stmt(stmt) => stmt.visit_with(self),
    }
  }

  fn rewrite_module_decl(&mut self, decl: &ModuleDecl) {
    match decl {
      ModuleDecl::Import(import) => {
        let range = self.byte_range(import);
        let src = self.slice(&*import.src);
        if import.specifiers.is_empty() {
          self.replace(range, format!("require({src});"));
          return;
        }
        let binding = self.next_binding();
        let mut statement = format!("const {binding} = require({src});");
        for specifier in &import.specifiers {
          let (local, value) = match specifier {
            ImportSpecifier::Named(named) => {
              let imported = match &named.imported {
                Some(imported) => self.property_access(imported),
                None => format!(".{}", named.local.sym),
              };
              (&named.local, format!("{binding}{imported}"))
            }
            ImportSpecifier::Default(default) => (
              &default.local,
              format!(
                "{binding} && {binding}.__esModule ? {binding}.default : \
                 {binding}"
              ),
            ),
            ImportSpecifier::Namespace(namespace) => {
              (&namespace.local, binding.clone())
            }
          };
          statement.push_str(&format!(" const {} = {};", local.sym, value));
        }
        self.replace(range, statement);
      }
      ModuleDecl::ExportDecl(export) => {
        self.has_exports = true;
        let item = self.byte_range(export);
        let decl_start = self.byte_range(&export.decl).start;
        self.blank(item.start..decl_start);
        export.decl.visit_with(self);
        let mut names = Vec::new();
        match &export.decl {
          Decl::Fn(func) => {
            // function declarations are hoisted, so their exports can be too
            self.head.push(format!("exports.{0} = {0};", func.ident.sym));
          }
          Decl::Class(class) => names.push(class.ident.sym.to_string()),
          Decl::Var(var) => {
            for declarator in &var.decls {
              collect_binding_names(&declarator.name, &mut names);
            }
          }
          _ => {}
        }
        if !names.is_empty() {
          let assignments = names
            .iter()
            .map(|name| format!(" exports.{name} = {name};"))
            .collect::<String>();
          self.insert(item.end, assignments);
        }
      }
      ModuleDecl::ExportDefaultExpr(export) => {
        self.has_exports = true;
        let item = self.byte_range(export);
        let expr_start = self.byte_range(&*export.expr).start;
        self.replace(item.start..expr_start, "exports.default = ".to_string());
        export.expr.visit_with(self);
      }
      ModuleDecl::ExportDefaultDecl(export) => {
        self.has_exports = true;
        let item = self.byte_range(export);
        let prefix = item.start..self.byte_range(&export.decl).start;
        let name = match &export.decl {
          DefaultDecl::Fn(func) => func.ident.as_ref(),
          DefaultDecl::Class(class) => class.ident.as_ref(),
          DefaultDecl::TsInterfaceDecl(_) => return,
        };
        match name {
          Some(name) => self.blank(prefix),
          None => self.replace(prefix, "exports.default = ".to_string()),
        }
        export.decl.visit_with(self);
        match (name, &export.decl) {
          (Some(name), DefaultDecl::Fn(_)) => {
            self.head.push(format!("exports.default = {};", name.sym));
          }
          (Some(name), _) => {
            self.insert(item.end, format!(" exports.default = {};", name.sym));
          }
          (None, _) => self.insert(item.end, ";".to_string()),
        }
      }
      ModuleDecl::ExportNamed(export) => {
        self.has_exports = true;
        let range = self.byte_range(export);
        let Some(src) = &export.src else {
          for specifier in &export.specifiers {
            if let ExportSpecifier::Named(named) = specifier {
              let exported = named.exported.as_ref().unwrap_or(&named.orig);
              let assignment = format!(
                "exports{} = {};",
                self.property_access(exported),
                self.slice(&named.orig)
              );
              self.tail.push(assignment);
            }
          }
          self.blank(range);
          return;
        };
        let binding = self.next_binding();
        let mut statement =
          format!("const {binding} = require({});", self.slice(&**src));
        for specifier in &export.specifiers {
          let (exported, value) = match specifier {
            ExportSpecifier::Named(named) => {
              let exported = named.exported.as_ref().unwrap_or(&named.orig);
              (
                self.property_access(exported),
                format!("{binding}{}", self.property_access(&named.orig)),
              )
            }
            ExportSpecifier::Namespace(namespace) => {
              (self.property_access(&namespace.name), binding.clone())
            }
            ExportSpecifier::Default(default) => (
              format!(".{}", default.exported.sym),
              format!("{binding}.default"),
            ),
          };
          statement.push_str(&format!(" exports{exported} = {value};"));
        }
        self.replace(range, statement);
      }
      ModuleDecl::ExportAll(export) => {
        self.has_exports = true;
        let range = self.byte_range(export);
        let binding = self.next_binding();
        let statement = format!(
          "const {binding} = require({src}); \
           Object.keys({binding}).forEach(function (key) {{ \
           if (key === \"default\" || key === \"__esModule\" || \
           Object.prototype.hasOwnProperty.call(exports, key)) return; \
           Object.defineProperty(exports, key, {{ enumerable: true, \
           get: function () {{ return {binding}[key]; }} }}); }});",
          src = self.slice(&*export.src),
        );
        self.replace(range, statement);
      }
      _ => {}
    }
  }

  fn finish(self) -> CommonJsModule {
    let mut head = vec!["\"use strict\";".to_string()];
    if self.has_exports {
      head.push(
        "Object.defineProperty(exports, \"__esModule\", { value: true });"
          .to_string(),
      );
    }
    head.extend(self.head);
    head.extend(self.hoisted);
    let mut text = head.join("\n");
    text.push('\n');
    let prepended_lines = text.matches('\n').count();

    text.push_str(&deno_ast::apply_text_changes(self.text, self.changes));
    if !self.tail.is_empty() {
      if !text.ends_with('\n') {
        text.push('\n');
      }
      text.push_str(&self.tail.join("\n"));
      text.push('\n');
    }
    CommonJsModule {
      text,
      prepended_lines,
    }
  }
}

impl Visit for CommonJsRewriter<'_> {
  noop_visit_type!();

  fn visit_call_expr(&mut self, node: &CallExpr) {
    let (Callee::Import(_), Some(first), Some(last)) =
      (&node.callee, node.args.first(), node.args.last())
    else {
      node.visit_children_with(self);
      return;
    };
    // import(x) -> Promise.resolve().then(() => require(x))
    let call = self.byte_range(node);
    let args = self.byte_range(first).start..self.byte_range(last).end;
    self.replace(
      call.start..args.start,
      "Promise.resolve().then(() => require(".to_string(),
    );
    for arg in &node.args {
      arg.visit_with(self);
    }
    self.replace(args.end..call.end, "))".to_string());
  }
}

fn is_hoisted_jest_call(stmt: &Stmt) -> bool {
  let Stmt::Expr(expr_stmt) = stmt else {
    return false;
  };
  let Expr::Call(call) = &*expr_stmt.expr else {
    return false;
  };
  let Callee::Expr(callee) = &call.callee else {
    return false;
  };
  let Expr::Member(member) = &**callee else {
    return false;
  };
  let Expr::Ident(object) = &*member.obj else {
    return false;
  };
  object.sym == "jest"
    && matches!(
      &member.prop,
      MemberProp::Ident(prop)
        if HOISTED_JEST_METHODS.iter().any(|method| prop.sym == *method)
    )
}

fn collect_binding_names(pat: &Pat, names: &mut Vec<String>) {
  match pat {
    Pat::Ident(ident) => names.push(ident.id.sym.to_string()),
    Pat::Array(array) => {
      for elem in array.elems.iter().flatten() {
        collect_binding_names(elem, names);
      }
    }
    Pat::Rest(rest) => collect_binding_names(&rest.arg, names),
    Pat::Object(object) => {
      for prop in &object.props {
        match prop {
          ObjectPatProp::KeyValue(key_value) => {
            collect_binding_names(&key_value.value, names)
          }
          ObjectPatProp::Assign(assign) => {
            names.push(assign.key.id.sym.to_string())
          }
          ObjectPatProp::Rest(rest) => collect_binding_names(&rest.arg, names),
        }
      }
    }
    Pat::Assign(assign) => collect_binding_names(&assign.left, names),
    Pat::Invalid(_) | Pat::Expr(_) => {}
  }
}
