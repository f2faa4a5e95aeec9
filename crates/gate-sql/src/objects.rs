// SPDX-License-Identifier: Apache-2.0

//! Target object extraction.
//!
//! Works on the token stream rather than the AST so it behaves the same for
//! every statement shape the grammar accepts. The result only feeds naming and
//! summaries; it never influences the risk tier except for `DROP DATABASE`.

use serde::{Deserialize, Serialize};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::command::SqlCommand;

/// Object a statement acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Lower-case object kind ("table", "index", "materialized_view", ...)
    pub kind: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    /// `schema.name`, or just `name` when unqualified.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Simplified token: only what object extraction needs.
#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// Unquoted word, upper-cased, plus its original spelling
    Keyword(String, String),
    /// Quoted identifier, verbatim
    Quoted(String),
    Period,
    Other,
}

impl Tok {
    fn keyword(&self) -> Option<&str> {
        match self {
            Tok::Keyword(upper, _) => Some(upper),
            _ => None,
        }
    }

    fn identifier(&self) -> Option<&str> {
        match self {
            Tok::Keyword(_, raw) => Some(raw),
            Tok::Quoted(raw) => Some(raw),
            _ => None,
        }
    }
}

fn tokens(text: &str) -> Option<Vec<Tok>> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, text).tokenize().ok()?;
    Some(
        tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)))
            .map(|t| match t {
                Token::Word(w) if w.quote_style.is_none() => Tok::Keyword(w.value.to_ascii_uppercase(), w.value),
                Token::Word(w) => Tok::Quoted(w.value),
                Token::Period => Tok::Period,
                _ => Tok::Other,
            })
            .collect(),
    )
}

/// Upper-cased unquoted words of a statement, in order.
pub fn keywords(text: &str) -> Vec<String> {
    tokens(text)
        .unwrap_or_default()
        .iter()
        .filter_map(|t| t.keyword().map(str::to_string))
        .collect()
}

const CREATE_MODIFIERS: &[&str] = &[
    "OR",
    "REPLACE",
    "TEMP",
    "TEMPORARY",
    "UNLOGGED",
    "UNIQUE",
    "GLOBAL",
    "LOCAL",
    "RECURSIVE",
    "TRUSTED",
    "PROCEDURAL",
    "DEFAULT",
    "ON",
];

const COMPOUND_KINDS: &[&str] = &["MATERIALIZED", "FOREIGN", "EVENT"];

const NAME_PREFIXES: &[&str] = &["IF", "NOT", "EXISTS", "CONCURRENTLY", "ONLY", "TABLE"];

struct Cursor<'a> {
    toks: &'a [Tok],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek_keyword(&self) -> Option<&'a str> {
        self.toks.get(self.pos).and_then(Tok::keyword)
    }

    /// Moves just past the first unquoted `word`; false when absent.
    fn seek(&mut self, word: &str) -> bool {
        while let Some(tok) = self.toks.get(self.pos) {
            self.pos += 1;
            if tok.keyword() == Some(word) {
                return true;
            }
        }
        false
    }

    fn skip_while(&mut self, words: &[&str]) {
        while let Some(kw) = self.peek_keyword() {
            if !words.contains(&kw) {
                break;
            }
            self.pos += 1;
        }
    }

    /// Object kind after CREATE/ALTER/DROP/COMMENT ON.
    fn object_kind(&mut self) -> Option<String> {
        let first = self.peek_keyword()?;
        self.pos += 1;
        if COMPOUND_KINDS.contains(&first) {
            if let Some(second) = self.peek_keyword() {
                self.pos += 1;
                return Some(format!("{}_{}", first, second).to_ascii_lowercase());
            }
        }
        Some(first.to_ascii_lowercase())
    }

    /// Dotted identifier chain, e.g. `public."Orders"`.
    fn identifier_chain(&mut self) -> Option<(Option<String>, String)> {
        let mut parts = vec![self.toks.get(self.pos)?.identifier()?.to_string()];
        self.pos += 1;
        while self.toks.get(self.pos) == Some(&Tok::Period) {
            match self.toks.get(self.pos + 1).and_then(Tok::identifier) {
                Some(part) => {
                    parts.push(part.to_string());
                    self.pos += 2;
                }
                None => break,
            }
        }
        let name = parts.pop()?;
        let schema = if parts.is_empty() { None } else { Some(parts.join(".")) };
        Some((schema, name))
    }
}

fn object(kind: Option<String>, chain: Option<(Option<String>, String)>) -> Option<ObjectRef> {
    let (schema, name) = chain?;
    Some(ObjectRef { kind, schema, name })
}

/// Target object of a statement, when one can be identified.
pub fn extract_object(command: SqlCommand, text: &str) -> Option<ObjectRef> {
    let toks = tokens(text)?;
    let mut cur = Cursor { toks: &toks, pos: 0 };
    let leading = cur.peek_keyword().unwrap_or_default();

    match command {
        SqlCommand::Create if matches!(leading, "SELECT" | "WITH") => {
            // SELECT ... INTO new_table
            if !cur.seek("INTO") {
                return None;
            }
            cur.skip_while(&["TEMP", "TEMPORARY", "UNLOGGED", "TABLE"]);
            object(Some("table".into()), cur.identifier_chain())
        }
        SqlCommand::Create | SqlCommand::Alter | SqlCommand::Drop | SqlCommand::Comment => {
            if !cur.seek(command.verb()) {
                return None;
            }
            cur.skip_while(CREATE_MODIFIERS);
            let kind = cur.object_kind();
            cur.skip_while(NAME_PREFIXES);
            // CREATE INDEX ON t (...) has no index name
            if cur.peek_keyword() == Some("ON") {
                cur.pos += 1;
                cur.skip_while(&["ONLY"]);
            }
            object(kind, cur.identifier_chain())
        }
        SqlCommand::Truncate => {
            cur.seek("TRUNCATE");
            cur.skip_while(&["TABLE", "ONLY"]);
            object(Some("table".into()), cur.identifier_chain())
        }
        SqlCommand::Grant | SqlCommand::Revoke => {
            let start = cur.pos;
            if cur.seek("ON") {
                let kind = match cur.peek_keyword() {
                    Some("ALL") => {
                        // ON ALL TABLES IN SCHEMA s
                        cur.seek("SCHEMA");
                        Some("schema".to_string())
                    }
                    Some(
                        kw @ ("TABLE" | "SEQUENCE" | "FUNCTION" | "PROCEDURE" | "SCHEMA" | "DATABASE" | "TYPE"
                        | "DOMAIN" | "LANGUAGE" | "TABLESPACE"),
                    ) => {
                        cur.pos += 1;
                        Some(kw.to_ascii_lowercase())
                    }
                    _ => Some("table".to_string()),
                };
                object(kind, cur.identifier_chain())
            } else {
                // GRANT role TO user
                cur.pos = start + 1;
                object(Some("role".into()), cur.identifier_chain())
            }
        }
        SqlCommand::Insert | SqlCommand::Merge => {
            if !cur.seek("INTO") {
                return None;
            }
            object(Some("table".into()), cur.identifier_chain())
        }
        SqlCommand::Update => {
            loop {
                if !cur.seek("UPDATE") {
                    return None;
                }
                let prev = cur.pos.checked_sub(2).and_then(|i| toks.get(i)).and_then(Tok::keyword);
                if !matches!(prev, Some("FOR") | Some("KEY")) {
                    break;
                }
            }
            cur.skip_while(&["ONLY"]);
            object(Some("table".into()), cur.identifier_chain())
        }
        SqlCommand::Delete => {
            if !cur.seek("DELETE") || !cur.seek("FROM") {
                return None;
            }
            cur.skip_while(&["ONLY"]);
            object(Some("table".into()), cur.identifier_chain())
        }
        SqlCommand::Copy => {
            cur.seek("COPY");
            object(Some("table".into()), cur.identifier_chain())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(command: SqlCommand, sql: &str) -> ObjectRef {
        extract_object(command, sql).unwrap_or_else(|| panic!("no object in {sql}"))
    }

    #[test]
    fn test_create_table_with_schema() {
        let o = obj(SqlCommand::Create, "CREATE TABLE IF NOT EXISTS public.orders (id int)");
        assert_eq!(o.kind.as_deref(), Some("table"));
        assert_eq!(o.schema.as_deref(), Some("public"));
        assert_eq!(o.name, "orders");
    }

    #[test]
    fn test_compound_kinds_and_modifiers() {
        let o = obj(SqlCommand::Create, "CREATE OR REPLACE MATERIALIZED VIEW stats AS SELECT 1");
        assert_eq!(o.kind.as_deref(), Some("materialized_view"));
        assert_eq!(o.name, "stats");

        let o = obj(SqlCommand::Create, "CREATE UNIQUE INDEX CONCURRENTLY idx_users_email ON users (email)");
        assert_eq!(o.kind.as_deref(), Some("index"));
        assert_eq!(o.name, "idx_users_email");
    }

    #[test]
    fn test_unnamed_index_targets_table() {
        let o = obj(SqlCommand::Create, "CREATE INDEX ON orders (created_at)");
        assert_eq!(o.name, "orders");
    }

    #[test]
    fn test_drop_and_truncate() {
        let o = obj(SqlCommand::Drop, "DROP TABLE IF EXISTS t CASCADE");
        assert_eq!(o.kind.as_deref(), Some("table"));
        assert_eq!(o.name, "t");

        let o = obj(SqlCommand::Drop, "DROP DATABASE prod");
        assert!(o.is_kind("database"));

        let o = obj(SqlCommand::Truncate, "TRUNCATE TABLE ONLY audit.events");
        assert_eq!(o.qualified_name(), "audit.events");
    }

    #[test]
    fn test_quoted_identifiers_keep_case() {
        let o = obj(SqlCommand::Alter, r#"ALTER TABLE "Sales"."Orders" ADD COLUMN note text"#);
        assert_eq!(o.schema.as_deref(), Some("Sales"));
        assert_eq!(o.name, "Orders");
    }

    #[test]
    fn test_grant_targets() {
        let o = obj(SqlCommand::Grant, "GRANT SELECT ON TABLE invoices TO analyst");
        assert_eq!(o.kind.as_deref(), Some("table"));
        assert_eq!(o.name, "invoices");

        let o = obj(SqlCommand::Revoke, "REVOKE ALL ON ALL TABLES IN SCHEMA billing FROM app");
        assert_eq!(o.kind.as_deref(), Some("schema"));
        assert_eq!(o.name, "billing");

        let o = obj(SqlCommand::Grant, "GRANT admin TO alice");
        assert_eq!(o.kind.as_deref(), Some("role"));
        assert_eq!(o.name, "admin");
    }

    #[test]
    fn test_dml_targets() {
        assert_eq!(obj(SqlCommand::Insert, "INSERT INTO logs (m) VALUES ('x')").name, "logs");
        assert_eq!(obj(SqlCommand::Update, "UPDATE ONLY accounts SET a = 1").name, "accounts");
        assert_eq!(obj(SqlCommand::Delete, "DELETE FROM sessions WHERE true").name, "sessions");
        assert_eq!(
            obj(SqlCommand::Update, "WITH x AS (SELECT 1 FOR UPDATE) UPDATE t SET a = 1").name,
            "t"
        );
    }

    #[test]
    fn test_select_into_creates_table() {
        let o = obj(SqlCommand::Create, "SELECT * INTO TEMP backup FROM orders");
        assert_eq!(o.kind.as_deref(), Some("table"));
        assert_eq!(o.name, "backup");
    }

    #[test]
    fn test_keywords_ignore_literals() {
        let words = keywords("SELECT 'DELETE FROM x' AS note");
        assert_eq!(words, vec!["SELECT", "AS", "NOTE"]);
    }
}
