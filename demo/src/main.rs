///
/// quern-demo - Exercise driver
///
/// Walks the whole procedure pack against an in-process engine: mixed
/// argument slots, scalar and nullable round trips, status codes as
/// data, blob content equality, vaulted strings, recursion through the
/// protocol, and nested result sets. Prints one line per check and
/// exits nonzero if any check fails.
///

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::Level;

use quern_bridge::{
    blobs_eq, BlobRef, BridgeError, ColumnKind, EngineApi, ProcCall, Session, ViewModel,
};
use quern_demo::build_engine;
use quern_demo::views::{InventoryRows, OutArgBlend, XRows};
use quern_engine::{status, EngineConfig, Storage};

#[derive(Parser)]
#[command(name = "quern-demo")]
#[command(author, version, about = "Exercise driver for the quern marshaling bridge", long_about = None)]
struct Cli {
    /// Back the engine with this file instead of in-memory storage
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log bridge and engine activity to stderr
    #[arg(long)]
    verbose: bool,
}

struct Checker {
    total: u32,
    failures: u32,
}

impl Checker {
    fn new() -> Self {
        Self {
            total: 0,
            failures: 0,
        }
    }

    fn check(&mut self, label: &str, ok: bool) {
        self.total += 1;
        if ok {
            println!("  ok   {label}");
        } else {
            self.failures += 1;
            println!("  FAIL {label}");
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();

    let storage = match cli.db {
        Some(path) => Storage::File(path),
        None => Storage::Memory,
    };

    let mut checker = Checker::new();
    if let Err(e) = run(storage, &mut checker) {
        eprintln!("Error running exercises: {e}");
        std::process::exit(1);
    }

    println!();
    if checker.failures > 0 {
        println!("{} of {} checks failed", checker.failures, checker.total);
        std::process::exit(1);
    }
    println!("all {} checks passed", checker.total);
}

fn run(storage: Storage, checker: &mut Checker) -> Result<(), BridgeError> {
    let engine = build_engine(EngineConfig { storage });
    let api = engine.api();
    println!(
        "engine ready, {} procedures registered",
        engine.procedures().len()
    );

    let mut session = Session::open(api.clone())?;

    blend_exercises(&api, checker)?;
    scalar_exercises(&api, checker)?;
    inout_exercises(&api, checker)?;
    blob_exercises(&api, checker)?;
    recursion_exercises(&api, checker)?;
    statement_exercises(&api, &session, checker)?;
    inventory_exercises(&api, &session, checker)?;

    session.close()?;
    checker.check(
        "second close reports not open",
        matches!(session.close(), Err(BridgeError::NotOpen)),
    );
    Ok(())
}

fn blend_exercises(api: &Arc<dyn EngineApi>, checker: &mut Checker) -> Result<(), BridgeError> {
    println!("\n== mixed argument slots ==");
    let outcome = ProcCall::new("out_arg_blend")
        .arg("_input")
        .arg(5i32)
        .inout(2i32)
        .out(ColumnKind::Int)
        .out(ColumnKind::Text)
        .invoke(api)?;
    let blend = OutArgBlend::decode(&outcome)?;
    println!(
        "out_arg_blend('_input', 5, 2) -> y={} z={} t={:?}",
        blend.y, blend.z, blend.t
    );
    checker.check("inout slot bumped", blend.y == 3);
    checker.check("out slot blends in and inout", blend.z == 7);
    checker.check("text out prefixed", blend.t == "prefix__input");
    Ok(())
}

fn scalar_exercises(api: &Arc<dyn EngineApi>, checker: &mut Checker) -> Result<(), BridgeError> {
    println!("\n== scalar outs and checks ==");
    let b = ProcCall::new("out_bool")
        .out(ColumnKind::Bool)
        .invoke(api)?
        .out::<bool>(0)?;
    let i = ProcCall::new("out_int")
        .out(ColumnKind::Int)
        .invoke(api)?
        .out::<i32>(0)?;
    let l = ProcCall::new("out_long")
        .out(ColumnKind::Long)
        .invoke(api)?
        .out::<i64>(0)?;
    let r = ProcCall::new("out_real")
        .out(ColumnKind::Double)
        .invoke(api)?
        .out::<f64>(0)?;
    println!("constants: {b} {i} {l} {r}");
    checker.check("bool constant", b);
    checker.check("int constant", i == 12);
    checker.check("long constant survives past 32 bits", l == 9_000_000_000);
    checker.check("real constant", r == 2.5);

    let matched = ProcCall::new("check_long")
        .arg(l)
        .arg(9_000_000_000i64)
        .invoke(api)?
        .status();
    checker.check("check_long accepts the round trip", matched == status::OK);
    let unmatched = ProcCall::new("check_int")
        .arg(1i32)
        .arg(2i32)
        .invoke(api)?
        .status();
    checker.check(
        "mismatch is a status, not an error",
        unmatched == status::CHECK_FAILED,
    );

    let absent = ProcCall::new("out_nullable_int")
        .out(ColumnKind::Int)
        .invoke(api)?
        .out::<Option<i32>>(0)?;
    checker.check("nullable out stays absent", absent.is_none());
    let both_absent = ProcCall::new("check_nullable_int")
        .arg(absent)
        .arg(None::<i32>)
        .invoke(api)?
        .status();
    checker.check("absent equals absent", both_absent == status::OK);
    let text_absent = ProcCall::new("check_nullable_text")
        .arg(None::<&str>)
        .arg(None::<&str>)
        .invoke(api)?
        .status();
    checker.check("absent text equals absent text", text_absent == status::OK);
    Ok(())
}

fn inout_exercises(api: &Arc<dyn EngineApi>, checker: &mut Checker) -> Result<(), BridgeError> {
    println!("\n== inout slots ==");
    let flipped = ProcCall::new("bump_bool")
        .inout(true)
        .invoke(api)?
        .out::<bool>(0)?;
    checker.check("bool flipped", !flipped);
    let bumped = ProcCall::new("bump_long")
        .inout(41i64)
        .invoke(api)?
        .out::<i64>(0)?;
    println!("bump_long(41) -> {bumped}");
    checker.check("long bumped", bumped == 42);
    let raised = ProcCall::new("bump_real")
        .inout(1.5f64)
        .invoke(api)?
        .out::<f64>(0)?;
    checker.check("real raised", raised == 2.0);

    let kept = ProcCall::new("bump_nullable_int")
        .inout(Some(4i32))
        .invoke(api)?
        .out::<Option<i32>>(0)?;
    checker.check("present inout bumped", kept == Some(5));
    let none = ProcCall::new("bump_nullable_int")
        .inout(None::<i32>)
        .invoke(api)?
        .out::<Option<i32>>(0)?;
    checker.check("absent inout stays absent", none.is_none());
    Ok(())
}

fn blob_exercises(api: &Arc<dyn EngineApi>, checker: &mut Checker) -> Result<(), BridgeError> {
    println!("\n== blobs ==");
    let mint = |text: &str| -> Result<BlobRef, BridgeError> {
        ProcCall::new("make_blob")
            .arg(text)
            .out(ColumnKind::Blob)
            .invoke(api)?
            .out::<BlobRef>(0)
    };
    let a = mint("grist for the mill")?;
    let b = mint("grist for the mill")?;
    let c = mint("chaff")?;
    println!("handles: {} {} {}", a.raw(), b.raw(), c.raw());
    checker.check("handles stay distinct", a != b);
    checker.check("equal content compares equal", blobs_eq(api.as_ref(), a, b)?);
    checker.check(
        "different content compares unequal",
        !blobs_eq(api.as_ref(), a, c)?,
    );

    let matched = ProcCall::new("check_blob").arg(a).arg(b).invoke(api)?.status();
    checker.check("engine agrees on equality", matched == status::OK);
    let unmatched = ProcCall::new("check_blob").arg(a).arg(c).invoke(api)?.status();
    checker.check("engine agrees on inequality", unmatched == status::CHECK_FAILED);

    let both_absent = ProcCall::new("check_nullable_blob")
        .arg(None::<BlobRef>)
        .arg(None::<BlobRef>)
        .invoke(api)?
        .status();
    checker.check("absent blob equals absent blob", both_absent == status::OK);
    let one_absent = ProcCall::new("check_nullable_blob")
        .arg(Some(a))
        .arg(None::<BlobRef>)
        .invoke(api)?
        .status();
    checker.check(
        "present and absent blobs differ",
        one_absent == status::CHECK_FAILED,
    );
    Ok(())
}

fn recursion_exercises(api: &Arc<dyn EngineApi>, checker: &mut Checker) -> Result<(), BridgeError> {
    println!("\n== recursion through the protocol ==");
    let f10 = ProcCall::new("fib")
        .arg(10i64)
        .out(ColumnKind::Long)
        .invoke(api)?
        .out::<i64>(0)?;
    println!("fib(10) = {f10}");
    checker.check("fib(10)", f10 == 55);
    Ok(())
}

fn statement_exercises(
    api: &Arc<dyn EngineApi>,
    session: &Session,
    checker: &mut Checker,
) -> Result<(), BridgeError> {
    println!("\n== statement result sets ==");
    let db = session.handle()?;

    let outcome = ProcCall::new("single_row").with_db(db).arg(314i64).invoke(api)?;
    let single = XRows::new(outcome.into_rows()?);
    println!("single_row(314): {} row, x={}", single.count()?, single.x(0)?);
    checker.check("single row", single.count()? == 1 && single.x(0)? == 314);

    let outcome = ProcCall::new("counted_rows").with_db(db).arg(300i64).invoke(api)?;
    let counted = XRows::new(outcome.into_rows()?);
    checker.check(
        "counted rows",
        counted.count()? == 2 && counted.x(0)? == 301 && counted.x(1)? == 302,
    );

    // A copied range lives on after its source is gone.
    let copy = counted.rows().copy_range(0, 1)?;
    drop(counted);
    checker.check("copied range is independent", copy.get_long(0, 0)? == 301);
    Ok(())
}

fn inventory_exercises(
    api: &Arc<dyn EngineApi>,
    session: &Session,
    checker: &mut Checker,
) -> Result<(), BridgeError> {
    println!("\n== inventory with nested details ==");
    let db = session.handle()?;
    let outcome = ProcCall::new("fetch_inventory").with_db(db).invoke(api)?;
    let mut inv = InventoryRows::new(outcome.into_rows()?);

    let count = inv.count()?;
    checker.check("five stocked parts", count == 5);
    for row in 0..count {
        let age = match inv.age(row)? {
            Some(age) => age.to_string(),
            None => "-".to_string(),
        };
        let serial = match inv.serial(row)? {
            Some(serial) => serial.to_string(),
            None => "-".to_string(),
        };
        println!(
            "[{}] {:<12} age {:>3}  rate {:>5}  serial {serial}",
            inv.id(row)?,
            inv.name(row)?,
            age,
            inv.rate(row)?,
        );
        let detail = inv.detail(row)?;
        for j in 0..detail.count()? {
            println!("      {} {}", detail.x(j)?, detail.y(j)?);
        }
    }
    checker.check(
        "rows come back ordered by name",
        inv.name(0)? == "bed stone" && inv.name(4)? == "spindle",
    );
    checker.check("damsel has no recorded age", inv.age(1)?.is_none());

    // The tag column carries the part name as bytes; prove it by
    // minting a fresh blob from the name and comparing content.
    let name = inv.name(2)?;
    let minted = ProcCall::new("make_blob")
        .arg(name.as_str())
        .out(ColumnKind::Blob)
        .invoke(api)?
        .out::<BlobRef>(0)?;
    checker.check(
        "tag content round trips",
        blobs_eq(api.as_ref(), inv.tag(2)?, minted)?,
    );

    // Lookups answer through the status channel, hit or miss.
    let found = ProcCall::new("find_part")
        .with_db(db)
        .arg("hopper")
        .out(ColumnKind::Long)
        .invoke(api)?;
    checker.check(
        "lookup hit carries the id",
        found.status() == status::OK && found.out::<i64>(0)? == 3,
    );
    let missing = ProcCall::new("find_part")
        .with_db(db)
        .arg("windmill")
        .out(ColumnKind::Long)
        .invoke(api)?;
    checker.check(
        "lookup miss is a status, not an error",
        missing.status() == status::ROW_NOT_FOUND && missing.out::<Option<i64>>(0)?.is_none(),
    );

    // Serials are vaulted: unreadable here, forwardable exactly.
    match inv.serial(0)? {
        Some(serial) => {
            let forwarded = ProcCall::new("check_text")
                .arg(serial)
                .arg("QRN-0001")
                .invoke(api)?
                .status();
            checker.check("vaulted serial forwards exactly", forwarded == status::OK);
        }
        None => checker.check("vaulted serial present", false),
    }
    checker.check(
        "clear-text read of a vaulted column is refused",
        inv.rows().get_text(0, 5).is_err(),
    );

    let second = ProcCall::new("fetch_inventory").with_db(db).invoke(api)?;
    let snapshot = InventoryRows::new(second.into_rows()?);
    checker.check("snapshots denote the same parts", inv.rows_same(0, &snapshot, 0)?);
    checker.check(
        "snapshots are distinct row for row",
        !inv.rows_eq(0, &snapshot, 0)?,
    );

    let detail = inv.detail(4)?;
    inv.close()?;
    checker.check("child outlives closed parent", detail.x(0)? == 1);
    checker.check(
        "closed parent refuses access",
        matches!(inv.id(0), Err(BridgeError::UseAfterDispose)),
    );
    checker.check(
        "second close refused",
        matches!(inv.close(), Err(BridgeError::UseAfterDispose)),
    );
    Ok(())
}
