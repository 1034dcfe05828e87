use crate::error::{GranaryError, GranaryResult};
use sqlparser::{ast::Statement, dialect::PostgreSqlDialect, parser::Parser};

pub fn parse_sql(sql: &str) -> GranaryResult<Vec<Statement>> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql)?;
    Ok(stmts)
}

pub fn parse_single_statement(sql: &str) -> GranaryResult<Statement> {
    let mut stmts = parse_sql(sql)?;
    if stmts.len() != 1 {
        return Err(GranaryError::Storage(format!(
            "expected exactly one statement, got {}",
            stmts.len()
        )));
    }
    Ok(stmts.remove(0))
}
