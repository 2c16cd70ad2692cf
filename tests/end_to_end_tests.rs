// End-to-end scenario: batched appends, sync, close, reopen, read back

use logbench::bench::{batch, DataShape};
use logbench::{CompressionType, EngineConfig, Sequence, SledOptions};
use tempfile::TempDir;

const VALUES: usize = 5000;
const VALUE_LEN: usize = 1000;

fn run_scenario(engine: &EngineConfig) {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = TempDir::new().unwrap();
    let mut rng = rand::rng();
    let shape = DataShape::RandomBytes { len: VALUE_LEN };
    let values: Vec<Vec<u8>> = (0..VALUES).map(|_| shape.generate(&mut rng).unwrap()).collect();

    // First session: append in preferred-size batches
    {
        let system = engine.open(dir.path()).unwrap();
        let mut next = 0;
        for n in batch(VALUES, system.preferred_transaction_size()) {
            system
                .update(&mut |updater| {
                    for value in &values[next..next + n] {
                        let seq = updater.append(value)?;
                        assert_eq!(seq, Sequence::new(next as u64));
                        next += 1;
                    }
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(next, VALUES);

        system.sync().unwrap();
        system.close().unwrap();
    }

    // Second session: a new instance against the same directory
    {
        let system = engine.open(dir.path()).unwrap();
        system
            .read(&mut |reader| {
                let value = reader.get(Sequence::new(2500))?;
                assert_eq!(value.len(), VALUE_LEN);
                assert_eq!(value, values[2500], "engine {}", engine.name());

                let last = reader.get(Sequence::new(VALUES as u64 - 1))?;
                assert_eq!(last, values[VALUES - 1]);
                assert!(reader.get(Sequence::new(VALUES as u64)).unwrap_err().is_not_found());
                Ok(())
            })
            .unwrap();
        system.close().unwrap();
    }
}

#[test]
fn test_end_to_end_redb() {
    run_scenario(&EngineConfig::redb(CompressionType::None));
}

#[test]
fn test_end_to_end_sled() {
    run_scenario(&EngineConfig::sled());
}

#[test]
fn test_end_to_end_sled_compressed() {
    run_scenario(&EngineConfig::Sled(SledOptions::new().compression_factor(3)));
}

#[test]
fn test_end_to_end_offset_log() {
    run_scenario(&EngineConfig::offset_log(CompressionType::None));
}

#[test]
fn test_end_to_end_compressed_codecs() {
    for compression in CompressionType::compressed() {
        run_scenario(&EngineConfig::redb(compression));
        run_scenario(&EngineConfig::offset_log(compression));
    }
}
