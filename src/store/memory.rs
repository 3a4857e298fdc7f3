//! Embedded in-memory datastore.
//!
//! Implements the subset of the document-store query language this crate
//! issues: `DEFINE TABLE/FIELD/INDEX [OVERWRITE]`, `INFO FOR DB/TABLE`,
//! `INSERT INTO <table> $rows`, and the `SELECT` family the repositories
//! use. SCHEMAFULL tables strip undefined fields, apply declared defaults,
//! and enforce declared unique indexes (including compound ones) with
//! row-level skip-on-duplicate for batch inserts.
//!
//! Backs `mem://` connection URLs; every test suite runs against it.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::driver::{Datastore, RecordId, SelectTarget};
use crate::store::response::Record;

/// In-memory engine behind the [`Datastore`] trait.
pub struct MemDatastore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, TableDef>,
    rows: BTreeMap<String, Vec<Record>>,
}

#[derive(Debug, Clone, Default)]
struct TableDef {
    schemafull: bool,
    fields: BTreeMap<String, FieldDef>,
    indexes: BTreeMap<String, IndexDef>,
}

#[derive(Debug, Clone)]
struct FieldDef {
    ty: String,
    optional: bool,
    default: Option<String>,
}

#[derive(Debug, Clone)]
struct IndexDef {
    columns: Vec<String>,
    unique: bool,
}

impl MemDatastore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MemDatastore {
    async fn query(&self, statement: &str, params: Value) -> Result<Value, StoreError> {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut inner = self.inner.write().await;
        let mut wrappers = Vec::new();
        for stmt in split_statements(statement) {
            let result = execute(&mut inner, &stmt, &params)?;
            wrappers.push(json!({ "result": result, "status": "OK", "time": "0ms" }));
        }
        Ok(Value::Array(wrappers))
    }

    async fn create(&self, table: &str, data: Value) -> Result<Value, StoreError> {
        let mut inner = self.inner.write().await;
        let record = match data {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Query(format!(
                    "create expects an object, got {other}"
                )))
            }
        };
        let stored = try_store(&mut inner, table, record, None)?;
        Ok(Value::Object(stored))
    }

    async fn upsert(&self, id: &RecordId, data: Value) -> Result<Value, StoreError> {
        let mut inner = self.inner.write().await;
        let record = match data {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Query(format!(
                    "upsert expects an object, got {other}"
                )))
            }
        };
        let stored = try_store(&mut inner, id.table(), record, Some(id.to_string()))?;
        Ok(Value::Object(stored))
    }

    async fn select(&self, target: SelectTarget) -> Result<Value, StoreError> {
        let inner = self.inner.read().await;
        match target {
            SelectTarget::Table(table) => {
                let rows = inner.rows.get(&table).cloned().unwrap_or_default();
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            SelectTarget::Record(id) => {
                let wanted = id.to_string();
                let row = inner
                    .rows
                    .get(id.table())
                    .and_then(|rows| rows.iter().find(|r| record_id_is(r, &wanted)))
                    .cloned();
                Ok(row.map(Value::Object).unwrap_or(Value::Null))
            }
        }
    }
}

fn record_id_is(record: &Record, wanted: &str) -> bool {
    record.get("id").and_then(Value::as_str) == Some(wanted)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Random 20-char lowercase key, the shape the real server generates.
fn generate_key() -> String {
    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuv";
    let mut rng = rand::thread_rng();
    (0..20)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

// ==================== Statement execution ====================

/// Strip `--` comments and split a script on `;`.
fn split_statements(script: &str) -> Vec<String> {
    let stripped: String = script
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");
    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn execute(inner: &mut Inner, statement: &str, params: &Map<String, Value>) -> Result<Value, StoreError> {
    let stmt = parse_statement(statement)?;
    match stmt {
        Stmt::DefineTable { name, schemafull } => {
            let def = inner.tables.entry(name.clone()).or_default();
            def.schemafull = schemafull;
            inner.rows.entry(name).or_default();
            Ok(Value::Null)
        }
        Stmt::DefineField {
            name,
            table,
            ty,
            default,
        } => {
            let optional = ty.starts_with("option<");
            let def = inner.tables.entry(table).or_default();
            def.fields
                .insert(name, FieldDef { ty, optional, default });
            Ok(Value::Null)
        }
        Stmt::DefineIndex {
            name,
            table,
            columns,
            unique,
        } => {
            let def = inner.tables.entry(table).or_default();
            def.indexes.insert(name, IndexDef { columns, unique });
            Ok(Value::Null)
        }
        Stmt::InfoForDb => {
            let tables: Map<String, Value> = inner
                .tables
                .iter()
                .map(|(name, def)| {
                    let schema = if def.schemafull { " SCHEMAFULL" } else { "" };
                    (
                        name.clone(),
                        json!(format!("DEFINE TABLE {name} TYPE NORMAL{schema} PERMISSIONS NONE")),
                    )
                })
                .collect();
            Ok(json!({ "tables": tables }))
        }
        Stmt::InfoForTable(table) => {
            let def = inner.tables.get(&table).cloned().unwrap_or_default();
            let fields: Map<String, Value> = def
                .fields
                .iter()
                .map(|(name, f)| {
                    let mut text = format!("DEFINE FIELD {name} ON {table} TYPE {}", f.ty);
                    if let Some(expr) = &f.default {
                        text.push_str(&format!(" DEFAULT {expr}"));
                    }
                    (name.clone(), json!(text))
                })
                .collect();
            let indexes: Map<String, Value> = def
                .indexes
                .iter()
                .map(|(name, idx)| {
                    let cols = idx.columns.join(", ");
                    let unique = if idx.unique { " UNIQUE" } else { "" };
                    (
                        name.clone(),
                        json!(format!("DEFINE INDEX {name} ON {table} FIELDS {cols}{unique}")),
                    )
                })
                .collect();
            Ok(json!({ "fields": fields, "indexes": indexes }))
        }
        Stmt::Insert { table, param } => {
            let rows = match params.get(&param) {
                Some(Value::Array(rows)) => rows.clone(),
                Some(Value::Object(row)) => vec![Value::Object(row.clone())],
                Some(other) => {
                    return Err(StoreError::Query(format!(
                        "insert variable ${param} must be an object or array, got {other}"
                    )))
                }
                None => {
                    return Err(StoreError::Query(format!(
                        "insert variable ${param} is not bound"
                    )))
                }
            };
            let mut inserted = Vec::new();
            for row in rows {
                let record = match row {
                    Value::Object(map) => map,
                    other => {
                        return Err(StoreError::Query(format!(
                            "insert rows must be objects, got {other}"
                        )))
                    }
                };
                // Unique-index conflicts skip the row; the rest of the
                // batch still goes in.
                match try_store(inner, &table, record, None) {
                    Ok(stored) => inserted.push(Value::Object(stored)),
                    Err(StoreError::UniqueViolation { .. }) => continue,
                    Err(err) => return Err(err),
                }
            }
            Ok(Value::Array(inserted))
        }
        Stmt::Select(select) => run_select(inner, &select, params),
    }
}

// ==================== Record pipeline ====================

fn try_store(
    inner: &mut Inner,
    table: &str,
    mut record: Record,
    target_id: Option<String>,
) -> Result<Record, StoreError> {
    let def = inner.tables.get(table).cloned().unwrap_or_default();

    let explicit_id = record
        .remove("id")
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|raw| {
            RecordId::parse(raw)
                .map(|id| id.table() == table)
                .unwrap_or(false)
        });

    if def.schemafull {
        record.retain(|key, _| def.fields.contains_key(key));
    }
    // NONE values on optional or defaulted fields are dropped, matching
    // how the real server omits them from responses; the default pass
    // below then fills defaulted fields back in.
    record.retain(|key, value| {
        !(value.is_null()
            && def
                .fields
                .get(key)
                .map_or(true, |f| f.optional || f.default.is_some()))
    });

    for (name, field) in &def.fields {
        if name.contains('.') || name.contains('*') {
            continue;
        }
        if !record.contains_key(name) {
            if let Some(expr) = &field.default {
                record.insert(name.clone(), eval_default(expr));
            } else if !field.optional {
                return Err(StoreError::Query(format!(
                    "Found NONE for field `{name}` on table `{table}`, but a non-optional value is required"
                )));
            }
        }
        if let Some(value) = record.get(name) {
            if !check_type(&field.ty, value) {
                return Err(StoreError::Query(format!(
                    "Found {value} for field `{name}` on table `{table}`, but expected a {}",
                    field.ty
                )));
            }
        }
    }

    let is_upsert = target_id.is_some();
    let id = match target_id.or(explicit_id) {
        Some(id) => id,
        None => loop {
            let candidate = format!("{table}:{}", generate_key());
            let taken = inner
                .rows
                .get(table)
                .map_or(false, |rows| rows.iter().any(|r| record_id_is(r, &candidate)));
            if !taken {
                break candidate;
            }
        },
    };

    let rows = inner.rows.entry(table.to_string()).or_default();
    let existing = rows.iter().position(|r| record_id_is(r, &id));

    if let Some(index_name) = unique_conflict(&def, rows, &record, existing) {
        return Err(StoreError::UniqueViolation {
            table: table.to_string(),
            detail: format!("index `{index_name}` already contains this value"),
        });
    }
    // A duplicate id on a plain insert is a conflict on the primary key.
    if existing.is_some() && !is_upsert {
        return Err(StoreError::UniqueViolation {
            table: table.to_string(),
            detail: format!("record `{id}` already exists"),
        });
    }

    record.insert("id".to_string(), json!(id));
    match existing {
        Some(pos) => rows[pos] = record.clone(),
        None => rows.push(record.clone()),
    }
    Ok(record)
}

fn unique_conflict(
    def: &TableDef,
    rows: &[Record],
    candidate: &Record,
    exclude: Option<usize>,
) -> Option<String> {
    for (name, index) in &def.indexes {
        if !index.unique {
            continue;
        }
        let key = index_key(def, index, candidate);
        let clash = rows.iter().enumerate().any(|(pos, row)| {
            Some(pos) != exclude && index_key(def, index, row) == key
        });
        if clash {
            return Some(name.clone());
        }
    }
    None
}

/// Canonical comparable encoding of a record's value tuple under an index.
fn index_key(def: &TableDef, index: &IndexDef, record: &Record) -> String {
    index
        .columns
        .iter()
        .map(|column| {
            let ty = def.fields.get(column).map(|f| f.ty.as_str()).unwrap_or("");
            match record.get(column) {
                None | Some(Value::Null) => "\u{0}none".to_string(),
                Some(value) => canonical_component(value, ty),
            }
        })
        .collect::<Vec<_>>()
        .join("\u{1}")
}

fn canonical_component(value: &Value, ty: &str) -> String {
    if ty.contains("datetime") {
        if let Some(micros) = value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp_micros())
        {
            return format!("dt:{micros}");
        }
    }
    match value {
        Value::Number(n) => format!("n:{}", n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => format!("s:{s}"),
        Value::Bool(b) => format!("b:{b}"),
        other => format!("j:{other}"),
    }
}

fn eval_default(expr: &str) -> Value {
    match expr {
        "true" => json!(true),
        "false" => json!(false),
        "time::now()" => json!(now_rfc3339()),
        other => other
            .parse::<f64>()
            .map(|n| json!(n))
            .unwrap_or_else(|_| json!(other.trim_matches('\'').to_string())),
    }
}

fn check_type(ty: &str, value: &Value) -> bool {
    let ty = ty.trim();
    if let Some(inner) = ty.strip_prefix("option<").and_then(|s| s.strip_suffix('>')) {
        return value.is_null() || check_type(inner, value);
    }
    match ty {
        "int" => value.as_i64().is_some() || value.as_u64().is_some(),
        "float" | "number" => value.is_number(),
        "string" => value.is_string(),
        "bool" => value.is_boolean(),
        "datetime" => value
            .as_str()
            .map_or(false, |s| DateTime::parse_from_rfc3339(s).is_ok()),
        "object" => value.is_object(),
        "array" => value.is_array(),
        t if t.starts_with("record<") => value
            .as_str()
            .map_or(false, |s| RecordId::parse(s).is_ok()),
        _ => true,
    }
}

// ==================== SELECT evaluation ====================

fn run_select(
    inner: &Inner,
    select: &SelectStmt,
    params: &Map<String, Value>,
) -> Result<Value, StoreError> {
    let def = inner.tables.get(&select.table).cloned().unwrap_or_default();
    let rows = inner.rows.get(&select.table).cloned().unwrap_or_default();

    let mut matched: Vec<Record> = Vec::new();
    'rows: for row in rows {
        for cond in &select.conds {
            if !eval_cond(&def, &row, cond, params)? {
                continue 'rows;
            }
        }
        matched.push(row);
    }

    if let Projection::Count(alias) = &select.projection {
        // `GROUP ALL` collapses to a single aggregate row.
        let mut row = Map::new();
        row.insert(alias.clone(), json!(matched.len()));
        return Ok(Value::Array(vec![Value::Object(row)]));
    }

    if let Some((field, ascending)) = &select.order {
        let as_datetime = def
            .fields
            .get(field)
            .map_or(false, |f| f.ty.contains("datetime"));
        matched.sort_by(|a, b| {
            let ord = cmp_values(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
                as_datetime,
            )
            .unwrap_or(Ordering::Equal);
            if *ascending {
                ord
            } else {
                ord.reverse()
            }
        });
    }

    if let Some(limit) = &select.limit {
        let n = resolve_limit(limit, params)?;
        matched.truncate(n);
    }

    Ok(Value::Array(matched.into_iter().map(Value::Object).collect()))
}

fn resolve_limit(limit: &LimitExpr, params: &Map<String, Value>) -> Result<usize, StoreError> {
    match limit {
        LimitExpr::Literal(n) => Ok(*n),
        LimitExpr::Param(name) => params
            .get(name)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| {
                StoreError::Query(format!("limit variable ${name} must be a non-negative int"))
            }),
    }
}

fn eval_cond(
    def: &TableDef,
    row: &Record,
    cond: &Cond,
    params: &Map<String, Value>,
) -> Result<bool, StoreError> {
    let (rhs, cast_datetime) = resolve_rhs(&cond.rhs, params)?;
    let lhs = row.get(&cond.field).unwrap_or(&Value::Null);
    let as_datetime = cast_datetime
        || def
            .fields
            .get(&cond.field)
            .map_or(false, |f| f.ty.contains("datetime"));

    let ord = cmp_values(lhs, &rhs, as_datetime);
    Ok(match cond.op {
        CmpOp::Eq => ord == Some(Ordering::Equal) || lhs == &rhs,
        CmpOp::Ne => !(ord == Some(Ordering::Equal) || lhs == &rhs),
        CmpOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Gt => ord == Some(Ordering::Greater),
        CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Lt => ord == Some(Ordering::Less),
    })
}

fn resolve_rhs(
    rhs: &RhsExpr,
    params: &Map<String, Value>,
) -> Result<(Value, bool), StoreError> {
    match rhs {
        RhsExpr::Param(name) => params
            .get(name)
            .cloned()
            .map(|v| (v, false))
            .ok_or_else(|| StoreError::Query(format!("variable ${name} is not bound"))),
        RhsExpr::Literal(value) => Ok((value.clone(), false)),
        RhsExpr::Thing { table, key } => {
            let key = match key {
                KeyExpr::Literal(s) => s.clone(),
                KeyExpr::Param(name) => match params.get(name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(other) => other.to_string(),
                    None => {
                        return Err(StoreError::Query(format!(
                            "variable ${name} is not bound"
                        )))
                    }
                },
            };
            Ok((json!(format!("{table}:{key}")), false))
        }
        RhsExpr::CastDatetime(inner) => {
            let (value, _) = resolve_rhs(inner, params)?;
            Ok((value, true))
        }
    }
}

fn cmp_values(lhs: &Value, rhs: &Value, as_datetime: bool) -> Option<Ordering> {
    if as_datetime {
        let parse = |v: &Value| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp_micros())
        };
        if let (Some(a), Some(b)) = (parse(lhs), parse(rhs)) {
            return Some(a.cmp(&b));
        }
    }
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

// ==================== Statement parser ====================

#[derive(Debug)]
enum Stmt {
    DefineTable {
        name: String,
        schemafull: bool,
    },
    DefineField {
        name: String,
        table: String,
        ty: String,
        default: Option<String>,
    },
    DefineIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    InfoForDb,
    InfoForTable(String),
    Insert {
        table: String,
        param: String,
    },
    Select(SelectStmt),
}

#[derive(Debug)]
struct SelectStmt {
    projection: Projection,
    table: String,
    conds: Vec<Cond>,
    order: Option<(String, bool)>,
    limit: Option<LimitExpr>,
}

#[derive(Debug)]
enum Projection {
    All,
    Count(String),
}

#[derive(Debug)]
struct Cond {
    field: String,
    op: CmpOp,
    rhs: RhsExpr,
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

#[derive(Debug)]
enum RhsExpr {
    Param(String),
    Literal(Value),
    Thing { table: String, key: KeyExpr },
    CastDatetime(Box<RhsExpr>),
}

#[derive(Debug)]
enum KeyExpr {
    Param(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Param(String),
    Str(String),
    Num(f64),
    Cast(String),
    Op(&'static str),
    Sym(char),
}

fn tokenize(statement: &str) -> Result<Vec<Tok>, StoreError> {
    let chars: Vec<char> = statement.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i == chars.len() {
                    return Err(StoreError::Unsupported(format!(
                        "unterminated string in statement: {statement}"
                    )));
                }
                i += 1;
                toks.push(Tok::Str(s));
            }
            '$' => {
                i += 1;
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                toks.push(Tok::Param(chars[start..i].iter().collect()));
            }
            '<' => {
                // `<datetime>` cast vs. a comparison operator.
                if i + 1 < chars.len() && chars[i + 1].is_ascii_alphabetic() {
                    let start = i + 1;
                    let mut j = start;
                    while j < chars.len() && chars[j] != '>' {
                        j += 1;
                    }
                    if j < chars.len() {
                        toks.push(Tok::Cast(chars[start..j].iter().collect()));
                        i = j + 1;
                        continue;
                    }
                }
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    toks.push(Tok::Op("<="));
                    i += 2;
                } else {
                    toks.push(Tok::Op("<"));
                    i += 1;
                }
            }
            '>' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    toks.push(Tok::Op(">="));
                    i += 2;
                } else {
                    toks.push(Tok::Op(">"));
                    i += 1;
                }
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                toks.push(Tok::Op("!="));
                i += 2;
            }
            '=' => {
                toks.push(Tok::Op("="));
                i += 1;
            }
            '(' | ')' | ',' | '*' => {
                toks.push(Tok::Sym(c));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).map_or(false, char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| {
                    StoreError::Unsupported(format!("bad number {text:?} in statement"))
                })?;
                toks.push(Tok::Num(n));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | ':' | '.'))
                {
                    i += 1;
                }
                // Trailing `.*` of a wildcard field path.
                if i < chars.len() && chars[i] == '*' && chars[i - 1] == '.' {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(StoreError::Unsupported(format!(
                    "unexpected character {other:?} in statement: {statement}"
                )))
            }
        }
    }
    Ok(toks)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    statement: String,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unsupported(&self, why: &str) -> StoreError {
        StoreError::Unsupported(format!("{why} in statement: {}", self.statement))
    }

    fn keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(word)) if word.eq_ignore_ascii_case(kw))
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), StoreError> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(self.unsupported(&format!("expected {kw}")))
        }
    }

    fn ident(&mut self) -> Result<String, StoreError> {
        match self.next() {
            Some(Tok::Ident(word)) => Ok(word),
            _ => Err(self.unsupported("expected identifier")),
        }
    }
}

fn parse_statement(statement: &str) -> Result<Stmt, StoreError> {
    let mut p = Parser {
        toks: tokenize(statement)?,
        pos: 0,
        statement: statement.to_string(),
    };

    if p.keyword("DEFINE") {
        return parse_define(&mut p);
    }
    if p.keyword("INFO") {
        p.expect_keyword("FOR")?;
        if p.keyword("DB") {
            return Ok(Stmt::InfoForDb);
        }
        p.expect_keyword("TABLE")?;
        return Ok(Stmt::InfoForTable(p.ident()?));
    }
    if p.keyword("INSERT") {
        p.expect_keyword("INTO")?;
        let table = p.ident()?;
        let param = match p.next() {
            Some(Tok::Param(name)) => name,
            _ => return Err(p.unsupported("INSERT expects a bind variable")),
        };
        return Ok(Stmt::Insert { table, param });
    }
    if p.keyword("SELECT") {
        return parse_select(&mut p);
    }
    Err(p.unsupported("unrecognized statement"))
}

fn parse_define(p: &mut Parser) -> Result<Stmt, StoreError> {
    if p.keyword("TABLE") {
        p.keyword("OVERWRITE");
        let name = p.ident()?;
        let schemafull = p.keyword("SCHEMAFULL");
        p.keyword("SCHEMALESS");
        return Ok(Stmt::DefineTable { name, schemafull });
    }
    if p.keyword("FIELD") {
        p.keyword("OVERWRITE");
        let name = p.ident()?;
        p.expect_keyword("ON")?;
        p.keyword("TABLE");
        let table = p.ident()?;
        p.keyword("FLEXIBLE");
        p.expect_keyword("TYPE")?;
        // `option<string>` tokenizes as the ident `option` followed by a
        // cast token holding the inner type; stitch them back together.
        let base = p.ident()?;
        let ty = match p.peek() {
            Some(Tok::Cast(inner)) => {
                let inner = inner.clone();
                p.next();
                format!("{base}<{inner}>")
            }
            _ => base,
        };
        let default = if p.keyword("DEFAULT") {
            match p.next() {
                Some(Tok::Ident(expr)) => {
                    // `time::now` tokenizes as an ident with the call
                    // parens following.
                    if matches!(p.peek(), Some(Tok::Sym('('))) {
                        p.next();
                        if !matches!(p.next(), Some(Tok::Sym(')'))) {
                            return Err(p.unsupported("expected ) after default call"));
                        }
                        Some(format!("{expr}()"))
                    } else {
                        Some(expr)
                    }
                }
                Some(Tok::Num(n)) => Some(n.to_string()),
                Some(Tok::Str(s)) => Some(format!("'{s}'")),
                _ => return Err(p.unsupported("expected default expression")),
            }
        } else {
            None
        };
        return Ok(Stmt::DefineField {
            name,
            table,
            ty,
            default,
        });
    }
    if p.keyword("INDEX") {
        p.keyword("OVERWRITE");
        let name = p.ident()?;
        p.expect_keyword("ON")?;
        p.keyword("TABLE");
        let table = p.ident()?;
        if !p.keyword("FIELDS") {
            p.expect_keyword("COLUMNS")?;
        }
        let mut columns = vec![p.ident()?];
        while matches!(p.peek(), Some(Tok::Sym(','))) {
            p.next();
            columns.push(p.ident()?);
        }
        let unique = p.keyword("UNIQUE");
        return Ok(Stmt::DefineIndex {
            name,
            table,
            columns,
            unique,
        });
    }
    Err(p.unsupported("unsupported DEFINE"))
}

fn parse_select(p: &mut Parser) -> Result<Stmt, StoreError> {
    let projection = if matches!(p.peek(), Some(Tok::Sym('*'))) {
        p.next();
        Projection::All
    } else if p.peek_keyword("count") {
        p.next();
        if !matches!(p.next(), Some(Tok::Sym('('))) || !matches!(p.next(), Some(Tok::Sym(')'))) {
            return Err(p.unsupported("expected count()"));
        }
        p.expect_keyword("AS")?;
        Projection::Count(p.ident()?)
    } else {
        return Err(p.unsupported("unsupported projection"));
    };

    p.expect_keyword("FROM")?;
    let table = p.ident()?;

    let mut conds = Vec::new();
    if p.keyword("WHERE") {
        loop {
            conds.push(parse_cond(p)?);
            if !p.keyword("AND") {
                break;
            }
        }
    }

    if p.keyword("GROUP") {
        p.expect_keyword("ALL")?;
    }

    let order = if p.keyword("ORDER") {
        p.expect_keyword("BY")?;
        let field = p.ident()?;
        let ascending = if p.keyword("DESC") {
            false
        } else {
            p.keyword("ASC");
            true
        };
        Some((field, ascending))
    } else {
        None
    };

    let limit = if p.keyword("LIMIT") {
        match p.next() {
            Some(Tok::Num(n)) => Some(LimitExpr::Literal(n as usize)),
            Some(Tok::Param(name)) => Some(LimitExpr::Param(name)),
            _ => return Err(p.unsupported("expected LIMIT value")),
        }
    } else {
        None
    };

    if p.peek().is_some() {
        return Err(p.unsupported("trailing tokens"));
    }

    Ok(Stmt::Select(SelectStmt {
        projection,
        table,
        conds,
        order,
        limit,
    }))
}

#[derive(Debug)]
enum LimitExpr {
    Literal(usize),
    Param(String),
}

fn parse_cond(p: &mut Parser) -> Result<Cond, StoreError> {
    let field = p.ident()?;
    let op = match p.next() {
        Some(Tok::Op("=")) => CmpOp::Eq,
        Some(Tok::Op("!=")) => CmpOp::Ne,
        Some(Tok::Op(">=")) => CmpOp::Ge,
        Some(Tok::Op(">")) => CmpOp::Gt,
        Some(Tok::Op("<=")) => CmpOp::Le,
        Some(Tok::Op("<")) => CmpOp::Lt,
        _ => return Err(p.unsupported("expected comparison operator")),
    };
    let rhs = parse_rhs(p)?;
    Ok(Cond { field, op, rhs })
}

fn parse_rhs(p: &mut Parser) -> Result<RhsExpr, StoreError> {
    match p.next() {
        Some(Tok::Param(name)) => Ok(RhsExpr::Param(name)),
        Some(Tok::Str(s)) => Ok(RhsExpr::Literal(json!(s))),
        Some(Tok::Num(n)) => {
            if n.fract() == 0.0 {
                Ok(RhsExpr::Literal(json!(n as i64)))
            } else {
                Ok(RhsExpr::Literal(json!(n)))
            }
        }
        Some(Tok::Cast(ty)) if ty.eq_ignore_ascii_case("datetime") => {
            Ok(RhsExpr::CastDatetime(Box::new(parse_rhs(p)?)))
        }
        Some(Tok::Ident(word)) if word.eq_ignore_ascii_case("true") => {
            Ok(RhsExpr::Literal(json!(true)))
        }
        Some(Tok::Ident(word)) if word.eq_ignore_ascii_case("false") => {
            Ok(RhsExpr::Literal(json!(false)))
        }
        Some(Tok::Ident(word)) if word.eq_ignore_ascii_case("NONE") || word.eq_ignore_ascii_case("NULL") => {
            Ok(RhsExpr::Literal(Value::Null))
        }
        Some(Tok::Ident(word)) if word == "type::thing" => {
            if !matches!(p.next(), Some(Tok::Sym('('))) {
                return Err(p.unsupported("expected ( after type::thing"));
            }
            let table = match p.next() {
                Some(Tok::Str(s)) => s,
                Some(Tok::Ident(word)) => word,
                _ => return Err(p.unsupported("expected table in type::thing")),
            };
            if !matches!(p.next(), Some(Tok::Sym(','))) {
                return Err(p.unsupported("expected , in type::thing"));
            }
            let key = match p.next() {
                Some(Tok::Param(name)) => KeyExpr::Param(name),
                Some(Tok::Str(s)) => KeyExpr::Literal(s),
                Some(Tok::Num(n)) => {
                    if n.fract() == 0.0 {
                        KeyExpr::Literal(format!("{}", n as i64))
                    } else {
                        KeyExpr::Literal(n.to_string())
                    }
                }
                _ => return Err(p.unsupported("expected key in type::thing")),
            };
            if !matches!(p.next(), Some(Tok::Sym(')'))) {
                return Err(p.unsupported("expected ) after type::thing"));
            }
            Ok(RhsExpr::Thing { table, key })
        }
        _ => Err(p.unsupported("unsupported right-hand side")),
    }
}
