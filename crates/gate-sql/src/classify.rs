// SPDX-License-Identifier: Apache-2.0

//! Risk classification of statement batches.

use gate_core::{EngineResult, RiskTier, StatementCategory};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::command::SqlCommand;
use crate::objects::ObjectRef;
use crate::parser::{ParsedStatement, StatementParser};

/// Category of a command.
pub fn category_for(command: SqlCommand) -> StatementCategory {
    match command {
        SqlCommand::Select | SqlCommand::Show | SqlCommand::Explain => StatementCategory::Query,
        SqlCommand::Insert | SqlCommand::Update | SqlCommand::Delete | SqlCommand::Merge | SqlCommand::Copy => {
            StatementCategory::DataModify
        }
        SqlCommand::Create | SqlCommand::Alter | SqlCommand::Drop | SqlCommand::Truncate | SqlCommand::Comment => {
            StatementCategory::SchemaChange
        }
        SqlCommand::Grant | SqlCommand::Revoke => StatementCategory::PermissionChange,
        SqlCommand::Begin
        | SqlCommand::Commit
        | SqlCommand::Rollback
        | SqlCommand::Savepoint
        | SqlCommand::ReleaseSavepoint => StatementCategory::TransactionControl,
        SqlCommand::Set | SqlCommand::Call | SqlCommand::AnonymousBlock | SqlCommand::Maintenance | SqlCommand::Other => {
            StatementCategory::Other
        }
    }
}

/// Risk tier of a statement. `None` for transaction control, which is never
/// executable.
pub fn tier_for(category: StatementCategory, command: SqlCommand, object: Option<&ObjectRef>) -> Option<RiskTier> {
    let tier = match category {
        StatementCategory::Query => RiskTier::Safe,
        StatementCategory::DataModify => RiskTier::Write,
        StatementCategory::SchemaChange => {
            if command == SqlCommand::Drop && object.is_some_and(|o| o.is_kind("database")) {
                RiskTier::Blocked
            } else {
                RiskTier::Destructive
            }
        }
        StatementCategory::PermissionChange => RiskTier::Destructive,
        StatementCategory::TransactionControl => return None,
        StatementCategory::Other => match command {
            SqlCommand::AnonymousBlock => RiskTier::Destructive,
            _ => RiskTier::Write,
        },
    };
    Some(tier)
}

/// A statement with its risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedStatement {
    pub index: usize,
    pub text: String,
    pub command: SqlCommand,
    pub category: StatementCategory,
    pub tier: Option<RiskTier>,
    pub object: Option<ObjectRef>,
}

impl From<ParsedStatement> for ClassifiedStatement {
    fn from(parsed: ParsedStatement) -> Self {
        let category = category_for(parsed.command);
        let tier = tier_for(category, parsed.command, parsed.object.as_ref());
        Self {
            index: parsed.index,
            text: parsed.text,
            command: parsed.command,
            category,
            tier,
            object: parsed.object,
        }
    }
}

impl ClassifiedStatement {
    /// Schema and permission changes are what the migration history tracks.
    pub fn changes_schema(&self) -> bool {
        matches!(
            self.category,
            StatementCategory::SchemaChange | StatementCategory::PermissionChange
        )
    }

    fn describe(&self) -> String {
        match &self.object {
            Some(object) => match &object.kind {
                Some(kind) => format!("{} {} {}", self.command.verb(), kind.to_uppercase(), object.qualified_name()),
                None => format!("{} {}", self.command.verb(), object.qualified_name()),
            },
            None => self.command.verb().to_string(),
        }
    }
}

/// Ordered, immutable result of classifying one request's SQL text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementBatch {
    raw: String,
    statements: Vec<ClassifiedStatement>,
}

impl StatementBatch {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn statements(&self) -> &[ClassifiedStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Highest member tier; transaction control does not contribute.
    pub fn aggregate_tier(&self) -> RiskTier {
        self.statements
            .iter()
            .filter_map(|s| s.tier)
            .max()
            .unwrap_or(RiskTier::Safe)
    }

    /// First explicit transaction-control statement, if any.
    pub fn transaction_control(&self) -> Option<&ClassifiedStatement> {
        self.statements
            .iter()
            .find(|s| s.category == StatementCategory::TransactionControl)
    }

    pub fn has_transaction_control(&self) -> bool {
        self.transaction_control().is_some()
    }

    /// First statement classified at `tier`.
    pub fn first_at(&self, tier: RiskTier) -> Option<&ClassifiedStatement> {
        self.statements.iter().find(|s| s.tier == Some(tier))
    }

    pub fn needs_migration(&self) -> bool {
        self.statements.iter().any(ClassifiedStatement::changes_schema)
    }

    /// Statement that names the batch: the first schema change, else the
    /// first statement at the aggregate tier.
    pub fn dominant(&self) -> Option<&ClassifiedStatement> {
        self.statements
            .iter()
            .find(|s| s.changes_schema())
            .or_else(|| self.first_at(self.aggregate_tier()))
    }

    pub fn statement_texts(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.text.clone()).collect()
    }

    /// SHA-256 over each statement's tier and token stream. Whitespace and
    /// comments between tokens are ignored; literals are hashed verbatim.
    pub fn fingerprint(&self) -> String {
        let dialect = PostgreSqlDialect {};
        let mut hasher = Sha256::new();
        for stmt in &self.statements {
            hasher.update(stmt.tier.map(|t| t.as_str()).unwrap_or("none").as_bytes());
            hasher.update([0u8]);
            match Tokenizer::new(&dialect, &stmt.text).tokenize() {
                Ok(tokens) => {
                    for token in tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_))) {
                        hasher.update(token.to_string().as_bytes());
                        hasher.update([0x1fu8]);
                    }
                }
                Err(_) => hasher.update(stmt.text.as_bytes()),
            }
            hasher.update([0xffu8]);
        }
        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// One-line description for logs and confirmation prompts.
    pub fn summary(&self) -> String {
        let lead = self
            .dominant()
            .map(ClassifiedStatement::describe)
            .unwrap_or_else(|| "empty batch".to_string());
        match self.len() {
            1 => lead,
            n => format!("{lead} (+{} more statements)", n - 1),
        }
    }
}

/// Splits and classifies `sql`. Pure: the same text always yields the same
/// batch.
pub fn classify(parser: &dyn StatementParser, sql: &str) -> EngineResult<StatementBatch> {
    let statements = parser
        .parse(sql)?
        .into_iter()
        .map(ClassifiedStatement::from)
        .collect();
    Ok(StatementBatch {
        raw: sql.to_string(),
        statements,
    })
}
