// SPDX-License-Identifier: Apache-2.0

//! Grammar-level command of a statement.

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// The operation a statement performs, as recognised by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlCommand {
    Select,
    Show,
    Explain,
    Insert,
    Update,
    Delete,
    Merge,
    Copy,
    Create,
    Alter,
    Drop,
    Truncate,
    Comment,
    Grant,
    Revoke,
    Begin,
    Commit,
    Rollback,
    Savepoint,
    ReleaseSavepoint,
    Set,
    Call,
    /// `DO` blocks: arbitrary procedural code
    AnonymousBlock,
    /// VACUUM, ANALYZE, CLUSTER, REINDEX, REFRESH
    Maintenance,
    Other,
}

impl SqlCommand {
    /// Command for a parsed statement.
    ///
    /// `EXPLAIN ANALYZE` executes its inner statement, so it reports the
    /// inner command.
    pub fn from_statement(statement: &Statement, leading_keyword: &str) -> Self {
        match statement {
            Statement::Query { .. } => SqlCommand::Select,
            Statement::Insert { .. } => SqlCommand::Insert,
            Statement::Update { .. } => SqlCommand::Update,
            Statement::Delete { .. } => SqlCommand::Delete,
            Statement::Merge { .. } => SqlCommand::Merge,
            Statement::Copy { .. } => SqlCommand::Copy,
            Statement::CreateTable { .. }
            | Statement::CreateIndex { .. }
            | Statement::CreateView { .. }
            | Statement::CreateSchema { .. }
            | Statement::CreateFunction { .. }
            | Statement::CreateExtension { .. }
            | Statement::CreateRole { .. }
            | Statement::CreateSequence { .. }
            | Statement::CreateType { .. }
            | Statement::CreateTrigger { .. }
            | Statement::CreatePolicy { .. }
            | Statement::CreateDatabase { .. } => SqlCommand::Create,
            Statement::AlterTable { .. }
            | Statement::AlterIndex { .. }
            | Statement::AlterView { .. }
            | Statement::AlterRole { .. } => SqlCommand::Alter,
            Statement::Drop { .. } | Statement::DropFunction { .. } => SqlCommand::Drop,
            Statement::Truncate { .. } => SqlCommand::Truncate,
            Statement::Comment { .. } => SqlCommand::Comment,
            Statement::Grant { .. } => SqlCommand::Grant,
            Statement::Revoke { .. } => SqlCommand::Revoke,
            Statement::StartTransaction { .. } => SqlCommand::Begin,
            Statement::Commit { .. } => SqlCommand::Commit,
            Statement::Rollback { .. } => SqlCommand::Rollback,
            Statement::Savepoint { .. } => SqlCommand::Savepoint,
            Statement::ReleaseSavepoint { .. } => SqlCommand::ReleaseSavepoint,
            Statement::Explain {
                analyze, statement, ..
            } => {
                if *analyze {
                    Self::from_statement(statement, "")
                } else {
                    SqlCommand::Explain
                }
            }
            Statement::ExplainTable { .. } => SqlCommand::Explain,
            Statement::Call { .. } => SqlCommand::Call,
            _ => Self::from_keyword(leading_keyword),
        }
    }

    /// Fallback for statements the AST match above does not name.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" | "VALUES" | "TABLE" | "WITH" => SqlCommand::Select,
            "SHOW" => SqlCommand::Show,
            "EXPLAIN" | "DESCRIBE" => SqlCommand::Explain,
            "INSERT" => SqlCommand::Insert,
            "UPDATE" => SqlCommand::Update,
            "DELETE" => SqlCommand::Delete,
            "MERGE" => SqlCommand::Merge,
            "COPY" => SqlCommand::Copy,
            "CREATE" => SqlCommand::Create,
            "ALTER" => SqlCommand::Alter,
            "DROP" => SqlCommand::Drop,
            "TRUNCATE" => SqlCommand::Truncate,
            "COMMENT" => SqlCommand::Comment,
            "GRANT" => SqlCommand::Grant,
            "REVOKE" => SqlCommand::Revoke,
            "BEGIN" | "START" => SqlCommand::Begin,
            "COMMIT" | "END" => SqlCommand::Commit,
            "ROLLBACK" | "ABORT" => SqlCommand::Rollback,
            "SAVEPOINT" => SqlCommand::Savepoint,
            "RELEASE" => SqlCommand::ReleaseSavepoint,
            "SET" | "RESET" => SqlCommand::Set,
            "CALL" => SqlCommand::Call,
            "DO" => SqlCommand::AnonymousBlock,
            "VACUUM" | "ANALYZE" | "ANALYSE" | "CLUSTER" | "REINDEX" | "REFRESH" => SqlCommand::Maintenance,
            _ => SqlCommand::Other,
        }
    }

    /// Upper-case verb used in summaries and error payloads.
    pub fn verb(&self) -> &'static str {
        match self {
            SqlCommand::Select => "SELECT",
            SqlCommand::Show => "SHOW",
            SqlCommand::Explain => "EXPLAIN",
            SqlCommand::Insert => "INSERT",
            SqlCommand::Update => "UPDATE",
            SqlCommand::Delete => "DELETE",
            SqlCommand::Merge => "MERGE",
            SqlCommand::Copy => "COPY",
            SqlCommand::Create => "CREATE",
            SqlCommand::Alter => "ALTER",
            SqlCommand::Drop => "DROP",
            SqlCommand::Truncate => "TRUNCATE",
            SqlCommand::Comment => "COMMENT",
            SqlCommand::Grant => "GRANT",
            SqlCommand::Revoke => "REVOKE",
            SqlCommand::Begin => "BEGIN",
            SqlCommand::Commit => "COMMIT",
            SqlCommand::Rollback => "ROLLBACK",
            SqlCommand::Savepoint => "SAVEPOINT",
            SqlCommand::ReleaseSavepoint => "RELEASE",
            SqlCommand::Set => "SET",
            SqlCommand::Call => "CALL",
            SqlCommand::AnonymousBlock => "DO",
            SqlCommand::Maintenance => "MAINTENANCE",
            SqlCommand::Other => "OTHER",
        }
    }

    pub fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            SqlCommand::Begin
                | SqlCommand::Commit
                | SqlCommand::Rollback
                | SqlCommand::Savepoint
                | SqlCommand::ReleaseSavepoint
        )
    }
}

/// Keywords that end the target list of a top-level SELECT.
const SELECT_LIST_END: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "WINDOW", "UNION", "INTERSECT", "EXCEPT", "ORDER", "LIMIT", "OFFSET",
    "FETCH", "FOR",
];

/// Refines a query command from its tokens.
///
/// A `WITH` query whose CTE body is INSERT/UPDATE/DELETE/MERGE modifies
/// data; the verb must open a parenthesised body, so columns or aliases
/// named `update` or `delete` do not count. `INTO` creates a table only in
/// the target list of a top-level SELECT. Row-locking clauses
/// (`FOR UPDATE`, `FOR NO KEY UPDATE`) are not writes.
///
/// A verb directly after any `(` is still taken as a CTE body, e.g. a
/// parenthesised column named `update`; that errs towards the higher tier.
pub fn refine_query(text: &str) -> SqlCommand {
    let Ok(tokens) = Tokenizer::new(&PostgreSqlDialect {}, text).tokenize() else {
        return SqlCommand::Select;
    };

    let mut depth = 0usize;
    let mut after_open = false;
    let mut in_select_list = false;
    let mut creates_table = false;

    for token in tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_))) {
        match token {
            Token::LParen => {
                depth += 1;
                after_open = true;
                continue;
            }
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(w) if w.quote_style.is_none() => {
                let word = w.value.to_ascii_uppercase();
                if after_open {
                    match word.as_str() {
                        "INSERT" => return SqlCommand::Insert,
                        "UPDATE" => return SqlCommand::Update,
                        "DELETE" => return SqlCommand::Delete,
                        "MERGE" => return SqlCommand::Merge,
                        _ => {}
                    }
                }
                if depth == 0 {
                    match word.as_str() {
                        "SELECT" => in_select_list = true,
                        "INTO" if in_select_list => creates_table = true,
                        kw if SELECT_LIST_END.contains(&kw) => in_select_list = false,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        after_open = false;
    }

    if creates_table {
        SqlCommand::Create
    } else {
        SqlCommand::Select
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(SqlCommand::from_keyword("vacuum"), SqlCommand::Maintenance);
        assert_eq!(SqlCommand::from_keyword("END"), SqlCommand::Commit);
        assert_eq!(SqlCommand::from_keyword("do"), SqlCommand::AnonymousBlock);
        assert_eq!(SqlCommand::from_keyword("LISTEN"), SqlCommand::Other);
    }

    #[test]
    fn test_refine_query_detects_data_modifying_cte() {
        assert_eq!(
            refine_query("WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d"),
            SqlCommand::Delete
        );
        assert_eq!(
            refine_query("WITH n AS MATERIALIZED ( INSERT INTO t VALUES (1) RETURNING id ) SELECT id FROM n"),
            SqlCommand::Insert
        );
        assert_eq!(refine_query("SELECT * FROM t FOR UPDATE"), SqlCommand::Select);
        assert_eq!(refine_query("SELECT * FROM t FOR NO KEY UPDATE"), SqlCommand::Select);
        assert_eq!(refine_query("SELECT * INTO copy FROM t"), SqlCommand::Create);
    }

    #[test]
    fn test_refine_query_ignores_identifiers_named_like_verbs() {
        assert_eq!(refine_query("SELECT update, delete AS insert FROM t"), SqlCommand::Select);
        assert_eq!(refine_query("SELECT t.update FROM t WHERE t.delete = 'into'"), SqlCommand::Select);
        assert_eq!(refine_query("SELECT \"into\" FROM t"), SqlCommand::Select);
    }

    #[test]
    fn test_refine_query_anchors_into_to_top_level_target_list() {
        assert_eq!(refine_query("SELECT a FROM t WHERE b IN (SELECT c INTO x FROM u)"), SqlCommand::Select);
        assert_eq!(refine_query("SELECT a FROM t ORDER BY a INTO"), SqlCommand::Select);
        assert_eq!(refine_query("SELECT a, b INTO TEMP snapshot FROM t"), SqlCommand::Create);
    }

    #[test]
    fn test_transaction_control_commands() {
        assert!(SqlCommand::Begin.is_transaction_control());
        assert!(SqlCommand::ReleaseSavepoint.is_transaction_control());
        assert!(!SqlCommand::Set.is_transaction_control());
    }
}
