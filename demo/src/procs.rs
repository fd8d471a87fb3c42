///
/// The demonstration procedure pack.
///
/// Everything the driver and the integration tests invoke is registered
/// here, grouped into families:
///
/// - `check_*` compare two incoming values and answer through the
///   status code, never through an error: OK on match, CHECK_FAILED
///   otherwise
/// - `out_*` return fixed constants through out slots; the nullable
///   variants return null
/// - `bump_*` advance an inout slot in a kind-specific way
/// - `make_blob` mints a blob from text, which is the only way a caller
///   can obtain a blob handle from scratch
/// - `out_arg_blend`, `fib`, `single_row`, `counted_rows`, and
///   `fetch_inventory` exercise mixed slots, protocol re-entry, and
///   result sets with nested children
/// - `find_part` reports a missing row as ROW_NOT_FOUND, keeping the
///   status channel and the error channel distinct
///

use quern_bridge::{
    BridgeError, ColumnDecl, ColumnKind, DbHandle, EngineApi, FromNative, ProcCall, RowsetHandle,
    Schema, Value,
};
use quern_engine::{status, BufferBuilder, Cell, Engine, ProcArgs, ProcReply};

/// Registers the whole pack on an engine.
pub fn register_all(engine: &Engine) {
    engine.register("check_bool", check_bool);
    engine.register("check_int", check_int);
    engine.register("check_long", check_long);
    engine.register("check_real", check_real);
    engine.register("check_nullable_bool", check_nullable_bool);
    engine.register("check_nullable_int", check_nullable_int);
    engine.register("check_nullable_long", check_nullable_long);
    engine.register("check_nullable_real", check_nullable_real);
    engine.register("check_text", check_text);
    engine.register("check_nullable_text", check_nullable_text);
    engine.register("check_blob", check_blob);
    engine.register("check_nullable_blob", check_nullable_blob);
    engine.register("make_blob", make_blob);
    engine.register("out_bool", out_bool);
    engine.register("out_int", out_int);
    engine.register("out_long", out_long);
    engine.register("out_real", out_real);
    engine.register("out_nullable_bool", out_nullable_bool);
    engine.register("out_nullable_int", out_nullable_int);
    engine.register("out_nullable_long", out_nullable_long);
    engine.register("out_nullable_real", out_nullable_real);
    engine.register("bump_bool", bump_bool);
    engine.register("bump_int", bump_int);
    engine.register("bump_long", bump_long);
    engine.register("bump_real", bump_real);
    engine.register("bump_nullable_bool", bump_nullable_bool);
    engine.register("bump_nullable_int", bump_nullable_int);
    engine.register("bump_nullable_long", bump_nullable_long);
    engine.register("bump_nullable_real", bump_nullable_real);
    engine.register("out_arg_blend", out_arg_blend);
    engine.register("fib", fib);
    engine.register("single_row", single_row);
    engine.register("counted_rows", counted_rows);
    engine.register("fetch_inventory", fetch_inventory);
    engine.register("find_part", find_part);
}

fn verdict(matches: bool) -> ProcReply {
    if matches {
        ProcReply::ok()
    } else {
        ProcReply::with_status(status::CHECK_FAILED)
    }
}

fn need_db(db: Option<DbHandle>) -> Result<DbHandle, BridgeError> {
    db.ok_or(BridgeError::NotOpen)
}

fn check_bool(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(args.get_bool(0)? == args.get_bool(1)?))
}

fn check_int(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(args.get_int(0)? == args.get_int(1)?))
}

fn check_long(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(args.get_long(0)? == args.get_long(1)?))
}

fn check_real(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    // Bit-exact: the codec must not perturb the value on the way in.
    Ok(verdict(args.get_double(0)? == args.get_double(1)?))
}

fn check_nullable_bool(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(
        args.get_nullable_bool(0)? == args.get_nullable_bool(1)?,
    ))
}

fn check_nullable_int(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(
        args.get_nullable_int(0)? == args.get_nullable_int(1)?,
    ))
}

fn check_nullable_long(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(
        args.get_nullable_long(0)? == args.get_nullable_long(1)?,
    ))
}

fn check_nullable_real(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(
        args.get_nullable_double(0)? == args.get_nullable_double(1)?,
    ))
}

fn check_text(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(args.get_text(0)? == args.get_text(1)?))
}

fn check_nullable_text(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(verdict(
        args.get_nullable_text(0)? == args.get_nullable_text(1)?,
    ))
}

/// Blob comparison happens engine-side by content, so two distinct
/// handles over equal payloads still match.
fn check_blob(
    engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let got = args.get_blob(0)?;
    let want = args.get_blob(1)?;
    Ok(verdict(engine.blob_eq(got, want)?))
}

/// Null pairings settle on presence alone; two present blobs compare by
/// content engine-side.
fn check_nullable_blob(
    engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let same = match (args.get_nullable_blob(0)?, args.get_nullable_blob(1)?) {
        (None, None) => true,
        (Some(got), Some(want)) => engine.blob_eq(got, want)?,
        _ => false,
    };
    Ok(verdict(same))
}

fn make_blob(
    engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let content = args.get_text(0)?;
    Ok(ProcReply::ok().out(engine.store_blob(content.into_bytes())))
}

fn out_bool(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(true))
}

fn out_int(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(12i32))
}

fn out_long(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    // Past 32 bits, so a narrowing codec would be caught.
    Ok(ProcReply::ok().out(9_000_000_000i64))
}

fn out_real(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(2.5f64))
}

fn out_nullable_bool(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(None::<bool>))
}

fn out_nullable_int(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(None::<i32>))
}

fn out_nullable_long(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(None::<i64>))
}

fn out_nullable_real(
    _engine: &Engine,
    _db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(None::<f64>))
}

fn bump_bool(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(!args.get_bool(0)?))
}

fn bump_int(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_int(0)? + 1))
}

fn bump_long(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_long(0)? + 1))
}

fn bump_real(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_double(0)? + 0.5))
}

fn bump_nullable_bool(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_nullable_bool(0)?.map(|v| !v)))
}

fn bump_nullable_int(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_nullable_int(0)?.map(|v| v + 1)))
}

fn bump_nullable_long(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_nullable_long(0)?.map(|v| v + 1)))
}

fn bump_nullable_real(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    Ok(ProcReply::ok().out(args.get_nullable_double(0)?.map(|v| v + 0.5)))
}

/// Mixed-slot showcase. Declared as (input text in, i int in, y int
/// inout, z int out, t text out); replies y + 1, i + y, and the prefixed
/// input, in slot order.
fn out_arg_blend(
    _engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let input = args.get_text(0)?;
    let i = args.get_int(1)?;
    let y = args.get_int(2)?;
    Ok(ProcReply::ok()
        .out(y + 1)
        .out(i + y)
        .out(format!("prefix_{input}")))
}

/// Recurses by invoking itself through the public protocol, not by
/// calling the handler function.
fn fib(
    engine: &Engine,
    _db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let n = args.get_long(0)?;
    if n < 2 {
        return Ok(ProcReply::ok().out(n.max(0)));
    }
    let api = engine.api();
    let a = ProcCall::new("fib")
        .arg(n - 1)
        .out(ColumnKind::Long)
        .invoke(&api)?;
    let b = ProcCall::new("fib")
        .arg(n - 2)
        .out(ColumnKind::Long)
        .invoke(&api)?;
    Ok(ProcReply::ok().out(a.out::<i64>(0)? + b.out::<i64>(0)?))
}

fn single_row(
    engine: &Engine,
    db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let db = need_db(db)?;
    let x = args.get_long(0)?;
    let rows = engine.query_rows(
        db,
        "SELECT ?1 AS x",
        &[Value::Long(x)],
        Schema::new(vec![ColumnDecl::new("x", ColumnKind::Long)]),
    )?;
    Ok(ProcReply::ok().rows(rows))
}

fn counted_rows(
    engine: &Engine,
    db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let db = need_db(db)?;
    let x = args.get_long(0)?;
    let rows = engine.query_rows(
        db,
        "SELECT ?1 + 1 AS x UNION ALL SELECT ?1 + 2 ORDER BY x",
        &[Value::Long(x)],
        Schema::new(vec![ColumnDecl::new("x", ColumnKind::Long)]),
    )?;
    Ok(ProcReply::ok().rows(rows))
}

const INVENTORY_SEED: &str = "\
CREATE TABLE IF NOT EXISTS inventory (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER,
    rate REAL NOT NULL,
    tag BLOB NOT NULL,
    serial TEXT NOT NULL
);
DELETE FROM inventory;
INSERT INTO inventory VALUES
    (1, 'bed stone', 112, 0.25, CAST('bed stone' AS BLOB), 'QRN-0001'),
    (2, 'damsel', NULL, 1.75, CAST('damsel' AS BLOB), 'QRN-0002'),
    (3, 'hopper', 57, 3.5, CAST('hopper' AS BLOB), 'QRN-0003'),
    (4, 'runner stone', 112, 0.25, CAST('runner stone' AS BLOB), 'QRN-0004'),
    (5, 'spindle', 8, 12.0, CAST('spindle' AS BLOB), 'QRN-0005');
";

const DETAIL_SQL: &str = "\
SELECT n + 1 AS x, printf('<< %s >>', n + 1) AS y
FROM (SELECT 0 AS n UNION ALL SELECT 1 UNION ALL SELECT 2)
ORDER BY x";

fn inventory_columns() -> Vec<ColumnDecl> {
    vec![
        ColumnDecl::new("id", ColumnKind::Long),
        ColumnDecl::new("name", ColumnKind::Text),
        ColumnDecl::new("age", ColumnKind::Int).nullable(),
        ColumnDecl::new("rate", ColumnKind::Double),
        ColumnDecl::new("tag", ColumnKind::Blob),
        ColumnDecl::new("serial", ColumnKind::Text).vaulted(),
    ]
}

/// Seeds the inventory table and returns it with a per-row child result
/// set attached. The scalar columns are materialized straight from SQL;
/// the detail column cannot be, so the handler re-queries per row and
/// splices the child handles in through a builder.
fn fetch_inventory(
    engine: &Engine,
    db: Option<DbHandle>,
    _args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let db = need_db(db)?;
    engine.exec(db, INVENTORY_SEED)?;

    let scalars = engine.query_rows(
        db,
        "SELECT id, name, age, rate, tag, serial FROM inventory ORDER BY name",
        &[],
        Schema::new(inventory_columns()).with_identity(vec![0]),
    )?;
    let spliced = splice_details(engine, db, scalars);
    engine.rowset_release(scalars)?;
    Ok(ProcReply::ok().rows(spliced?))
}

/// Widens `scalars` with the detail column. A mid-splice failure releases
/// every detail handle minted so far; `scalars` stays with the caller
/// either way.
fn splice_details(
    engine: &Engine,
    db: DbHandle,
    scalars: RowsetHandle,
) -> Result<RowsetHandle, BridgeError> {
    let mut cols = inventory_columns();
    cols.push(ColumnDecl::new("detail", ColumnKind::Rows));
    let mut builder = BufferBuilder::new(Schema::new(cols).with_identity(vec![0]));

    let mut details = Vec::new();
    if let Err(err) = fill_details(engine, db, scalars, &mut builder, &mut details) {
        for detail in details {
            let _ = engine.rowset_release(detail);
        }
        return Err(err);
    }
    Ok(engine.store_buffer(builder.finish()))
}

fn fill_details(
    engine: &Engine,
    db: DbHandle,
    scalars: RowsetHandle,
    builder: &mut BufferBuilder,
    details: &mut Vec<RowsetHandle>,
) -> Result<(), BridgeError> {
    let width = inventory_columns().len();
    for row in 0..engine.rowset_count(scalars)? {
        let mut cells = Vec::with_capacity(width + 1);
        for col in 0..width {
            cells.push(Cell::Val(engine.rowset_value(scalars, row, col)?));
        }
        let detail = engine.query_rows(
            db,
            DETAIL_SQL,
            &[],
            Schema::new(vec![
                ColumnDecl::new("x", ColumnKind::Long),
                ColumnDecl::new("y", ColumnKind::Text),
            ]),
        )?;
        details.push(detail);
        cells.push(Cell::Rows(detail.raw()));
        builder.push_row(cells)?;
    }
    Ok(())
}

/// Looks an inventory row up by name. A missing row answers through the
/// status code with a null out slot, never through an error.
fn find_part(
    engine: &Engine,
    db: Option<DbHandle>,
    args: &ProcArgs,
) -> Result<ProcReply, BridgeError> {
    let db = need_db(db)?;
    let name = args.get_text(0)?;
    engine.exec(db, INVENTORY_SEED)?;
    let rows = engine.query_rows(
        db,
        "SELECT id FROM inventory WHERE name = ?1",
        &[Value::Text(name)],
        Schema::new(vec![ColumnDecl::new("id", ColumnKind::Long)]),
    )?;
    let found = first_id(engine, rows);
    engine.rowset_release(rows)?;
    Ok(match found? {
        Some(id) => ProcReply::ok().out(id),
        None => ProcReply::with_status(status::ROW_NOT_FOUND).out(None::<i64>),
    })
}

/// Reads the id out of the first row, if any. `rows` stays with the caller.
fn first_id(engine: &Engine, rows: RowsetHandle) -> Result<Option<i64>, BridgeError> {
    if engine.rowset_count(rows)? == 0 {
        return Ok(None);
    }
    let id = i64::from_native(&engine.rowset_value(rows, 0, 0)?, "find_part id")?;
    Ok(Some(id))
}
