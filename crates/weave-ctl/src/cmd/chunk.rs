//! Offline commands: inspect a file's chunk layout and check its proofs.

use anyhow::{bail, Context, Result};

use weave_core::crypto::b64url_encode;
use weave_core::{validate_chunk, ChunkPlan};

fn read_file(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read file: {}", path))
}

pub fn cmd_chunk(path: &str) -> Result<()> {
    let data = read_file(path)?;
    let plan = ChunkPlan::generate(&data);

    println!("═══════════════════════════════════════");
    println!("  Chunk Layout");
    println!("═══════════════════════════════════════");
    println!("  File      : {}", path);
    println!("  Size      : {} bytes", plan.data_size);
    println!("  Data root : {}", plan.encoded_root());
    println!("  Chunks    : {}", plan.len());

    for (i, chunk) in plan.chunks.iter().enumerate() {
        println!(
            "  {:>5}  [{:>12}, {:>12})  {:>7} B  {}",
            i,
            chunk.min_byte_range,
            chunk.max_byte_range,
            chunk.len(),
            b64url_encode(&chunk.data_hash)
        );
    }

    Ok(())
}

pub fn cmd_verify(path: &str) -> Result<()> {
    let data = read_file(path)?;
    let plan = ChunkPlan::generate(&data);

    let mut failed = 0;
    for (i, proof) in plan.proofs.iter().enumerate() {
        let bytes = plan.chunk_bytes(i, &data)?;
        match validate_chunk(&plan.data_root, proof.offset, plan.data_size, bytes, &proof.path) {
            Ok(_) => println!(
                "  ✓ chunk {:>5}  offset {:>12}  proof {} B",
                i,
                proof.offset,
                proof.path.len()
            ),
            Err(e) => {
                failed += 1;
                println!("  ✗ chunk {:>5}  offset {:>12}  {}", i, proof.offset, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} chunks failed validation", failed, plan.len());
    }
    println!("All {} chunks verify against {}", plan.len(), plan.encoded_root());
    Ok(())
}
