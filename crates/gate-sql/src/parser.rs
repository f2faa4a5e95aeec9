// SPDX-License-Identifier: Apache-2.0

//! Statement splitting on PostgreSQL grammar boundaries.

use gate_core::{EngineError, EngineResult};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::command::{refine_query, SqlCommand};
use crate::objects::{extract_object, keywords, ObjectRef};

/// Nesting limit handed to the grammar; deeper input is a syntax error.
const DEFAULT_RECURSION_LIMIT: usize = 64;

/// One statement of the input, as the grammar sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    /// Position inside the batch
    pub index: usize,
    /// Verbatim statement text, without the terminating semicolon
    pub text: String,
    /// First word of the statement, upper-cased
    pub leading_keyword: String,
    pub command: SqlCommand,
    pub object: Option<ObjectRef>,
}

/// Grammar capability used by the classifier.
///
/// Any PostgreSQL-accurate parser can sit behind it. Implementations must
/// reject the whole input when any statement fails to parse.
pub trait StatementParser: Send + Sync {
    fn parse(&self, sql: &str) -> EngineResult<Vec<ParsedStatement>>;
}

/// `sqlparser` with the PostgreSQL dialect.
#[derive(Debug, Clone)]
pub struct PostgresParser {
    recursion_limit: usize,
}

impl PostgresParser {
    pub fn new() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
}

impl Default for PostgresParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for PostgresParser {
    fn parse(&self, sql: &str) -> EngineResult<Vec<ParsedStatement>> {
        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect)
            .with_recursion_limit(self.recursion_limit)
            .try_with_sql(sql)
            .map_err(|e| EngineError::syntax_error(e.to_string()))?;
        let lines = LineIndex::new(sql);
        let mut statements = Vec::new();

        loop {
            while parser.consume_token(&Token::SemiColon) {}

            let head = parser.peek_nth_token_ref(0);
            if head.token == Token::EOF {
                break;
            }
            let start = lines.offset(sql, head.span.start.line, head.span.start.column);

            let index = statements.len();
            let statement = parser
                .parse_statement()
                .map_err(|e| EngineError::syntax_error_at(index, e.to_string()))?;

            let next = parser.peek_nth_token_ref(0);
            let end = match &next.token {
                Token::EOF => Some(sql.len()),
                Token::SemiColon => lines.offset(sql, next.span.start.line, next.span.start.column),
                other => {
                    return Err(EngineError::syntax_error_at(
                        index,
                        format!("Expected end of statement, found: {other}"),
                    ))
                }
            };

            let text = match (start, end) {
                (Some(start), Some(end)) if start < end => sql
                    .get(start..end)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_else(|| statement.to_string()),
                _ => statement.to_string(),
            };

            let words = keywords(&text);
            let leading_keyword = words.first().cloned().unwrap_or_default();
            let mut command = SqlCommand::from_statement(&statement, &leading_keyword);
            if command == SqlCommand::Select {
                command = refine_query(&text);
            }
            let object = extract_object(command, &text);

            statements.push(ParsedStatement {
                index,
                text,
                leading_keyword,
                command,
                object,
            });
        }

        if statements.is_empty() {
            return Err(EngineError::syntax_error("No SQL statements found"));
        }
        Ok(statements)
    }
}

/// Maps 1-based (line, column) token locations to byte offsets.
///
/// Columns count characters, so multi-byte text needs the per-line walk.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn offset(&self, sql: &str, line: u64, column: u64) -> Option<usize> {
        let line_start = *self.starts.get(usize::try_from(line).ok()?.checked_sub(1)?)?;
        let column = usize::try_from(column).ok()?.checked_sub(1)?;
        let rest = &sql[line_start..];
        match rest.char_indices().nth(column) {
            Some((i, _)) => Some(line_start + i),
            None if rest.chars().count() == column => Some(sql.len()),
            None => None,
        }
    }
}
