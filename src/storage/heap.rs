use crate::buffer::BufferManager;
use crate::catalog::{object_name, Catalog, DataType};
use crate::error::{GranaryError, GranaryResult};
use crate::sql::parse_single_statement;
use crate::storage::codec::HeapPageCodec;
use crate::storage::disk::HeapFile;
use crate::storage::page::{HeapPage, RecordId};
use crate::storage::tuple::{TupleCodec, Value};
use std::sync::Arc;

/// Stateless tuple-level facade over a heap file. All page traffic goes
/// through the buffer manager.
pub struct HeapFileManager;

impl HeapFileManager {
    /// First-fit insert: scan existing pages in order and take the first one
    /// with room, allocating a fresh page only when none fits.
    pub fn insert_tuple(
        tuple: &[u8],
        file: &Arc<HeapFile>,
        buffer: &BufferManager,
    ) -> GranaryResult<RecordId> {
        for page_id in file.page_ids() {
            let guard = buffer.read_page(file, page_id)?;
            let mut page = HeapPageCodec::decode(&*guard.read(), page_id)?;
            if page.has_space_for_record(tuple.len()) {
                let rid = page.insert_record(tuple)?;
                HeapPageCodec::encode_into(&page, &mut *guard.write());
                guard.unpin(true);
                return Ok(rid);
            }
            // full page: guard drops clean
        }

        let (page_id, guard) = buffer.alloc_page(file)?;
        let mut page = HeapPage::new(page_id);
        let rid = page.insert_record(tuple)?;
        HeapPageCodec::encode_into(&page, &mut *guard.write());
        guard.unpin(true);
        Ok(rid)
    }

    pub fn delete_tuple(
        rid: RecordId,
        file: &Arc<HeapFile>,
        buffer: &BufferManager,
    ) -> GranaryResult<()> {
        let guard = buffer.read_page(file, rid.page_id)?;
        let mut page = HeapPageCodec::decode(&*guard.read(), rid.page_id)?;
        page.delete_record(rid.slot_id)?;
        HeapPageCodec::encode_into(&page, &mut *guard.write());
        guard.unpin(true);
        Ok(())
    }

    /// Serializes the single row of an `INSERT INTO t VALUES (…);` statement
    /// against the table's schema in the catalog. String values may be
    /// single-quoted or bare; integers may be negative.
    pub fn create_tuple_from_sql(sql: &str, catalog: &Catalog) -> GranaryResult<Vec<u8>> {
        let (table_name, source) = match parse_single_statement(sql)? {
            sqlparser::ast::Statement::Insert {
                table_name, source, ..
            } => (table_name, source),
            other => {
                return Err(GranaryError::Storage(format!(
                    "expected an INSERT statement, got: {}",
                    other
                )))
            }
        };
        let table_name = object_name(&table_name)?;
        let schema = catalog.table_schema(catalog.table_id(&table_name)?)?;

        let Some(query) = source else {
            return Err(GranaryError::NotSupport(
                "INSERT without a VALUES clause".to_string(),
            ));
        };
        let sqlparser::ast::SetExpr::Values(values) = *query.body else {
            return Err(GranaryError::NotSupport(
                "INSERT source must be a VALUES clause".to_string(),
            ));
        };
        let [row] = values.rows.as_slice() else {
            return Err(GranaryError::NotSupport(format!(
                "expected exactly one VALUES row, got {}",
                values.rows.len()
            )));
        };
        if row.len() != schema.attr_count() {
            return Err(GranaryError::Storage(format!(
                "INSERT into {} supplies {} values for {} attributes",
                table_name,
                row.len(),
                schema.attr_count()
            )));
        }

        let mut tuple_values = Vec::with_capacity(row.len());
        for (attr, expr) in schema.attributes.iter().zip(row) {
            tuple_values.push(bind_literal(expr, &attr.data_type, &attr.name)?);
        }
        TupleCodec::encode(schema, &tuple_values)
    }
}

fn bind_literal(
    expr: &sqlparser::ast::Expr,
    data_type: &DataType,
    attr_name: &str,
) -> GranaryResult<Value> {
    let text = literal_text(expr)?;
    match data_type {
        DataType::Int => text.parse::<i32>().map(Value::Int).map_err(|_| {
            GranaryError::Storage(format!(
                "value '{}' is not a valid INT for attribute {}",
                text, attr_name
            ))
        }),
        DataType::Char(_) => Ok(Value::Char(text)),
        DataType::Varchar(_) => Ok(Value::Varchar(text)),
    }
}

fn literal_text(expr: &sqlparser::ast::Expr) -> GranaryResult<String> {
    match expr {
        sqlparser::ast::Expr::Value(sqlparser::ast::Value::Number(s, _)) => Ok(s.clone()),
        sqlparser::ast::Expr::Value(sqlparser::ast::Value::SingleQuotedString(s)) => Ok(s.clone()),
        // bare word, e.g. INSERT INTO t VALUES (1, foo)
        sqlparser::ast::Expr::Identifier(ident) => Ok(ident.value.clone()),
        sqlparser::ast::Expr::UnaryOp {
            op: sqlparser::ast::UnaryOperator::Minus,
            expr,
        } => Ok(format!("-{}", literal_text(expr)?)),
        _ => Err(GranaryError::NotSupport(format!(
            "unsupported literal {} in VALUES",
            expr
        ))),
    }
}
