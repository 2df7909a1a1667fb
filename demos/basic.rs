//! Basic usage example for bdelta.

use bdelta::{BDelta, PassFlags, Source, diff};

fn main() {
    // Example 1: simple text modification with the one-shot API
    println!("=== Example 1: One-Shot Diff ===");
    let source: &[u8] = b"The quick brown fox jumps over the lazy dog";
    let target: &[u8] = b"The quick brown cat jumps over the lazy dog";

    match diff(source, target) {
        Ok(matches) => {
            println!("Source: {:?}", String::from_utf8_lossy(source));
            println!("Target: {:?}", String::from_utf8_lossy(target));
            for m in &matches {
                println!(
                    "  copy {:>3} tokens from source[{:>3}] to target[{:>3}]: {:?}",
                    m.num,
                    m.p1,
                    m.p2,
                    String::from_utf8_lossy(&source[m.p1..m.p1 + m.num])
                );
            }
            let covered: usize = matches.iter().map(|m| m.num).sum();
            println!(
                "Covered {covered} of {} target bytes ({:.1}%)",
                target.len(),
                covered as f64 / target.len() as f64 * 100.0
            );
        }
        Err(e) => eprintln!("Diff error: {}", e),
    }

    println!();

    // Example 2: driving passes by hand on larger data
    println!("=== Example 2: Pass-by-Pass Control ===");
    let size = 100_000;
    let mut base = vec![0u8; size];
    for (i, byte) in base.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let mut edited = base.clone();
    for i in (0..size).step_by(500) {
        edited[i] = edited[i].wrapping_add(1);
    }

    let mut engine = BDelta::new(Source::from(&base[..]), Source::from(&edited[..]));
    let mut blocksize = 1024;
    engine
        .pass(
            blocksize,
            blocksize,
            0,
            PassFlags {
                global: true,
                ..Default::default()
            },
        )
        .expect("nonzero blocksize");
    while blocksize > 16 {
        blocksize /= 2;
        engine
            .pass(blocksize, blocksize, 0, PassFlags::default())
            .expect("nonzero blocksize");
        println!(
            "after blocksize {:>4}: {} matches",
            blocksize,
            engine.num_matches()
        );
    }
    engine.clean_matches(true);

    let covered: usize = engine.matches().map(|m| m.num).sum();
    println!(
        "Final: {} matches covering {covered} of {size} bytes",
        engine.num_matches()
    );

    println!();

    // Example 3: sequences read through a callback
    println!("=== Example 3: Callback Readers ===");
    let stored: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
    let reader = |offset: usize, buf: &mut [u8]| {
        buf.copy_from_slice(&stored[offset..offset + buf.len()]);
    };

    let mut engine = BDelta::new(
        Source::from_reader(stored.len(), reader),
        Source::from_reader(stored.len(), reader),
    );
    engine
        .pass(
            64,
            64,
            0,
            PassFlags {
                global: true,
                ..Default::default()
            },
        )
        .expect("nonzero blocksize");
    engine.clean_matches(true);
    if let Some(m) = engine.get_match(0) {
        println!("Identical streams collapse to one match: {m}");
    }

    println!();
    println!("=== All Examples Completed ===");
}
