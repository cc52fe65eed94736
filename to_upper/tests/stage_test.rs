#[macro_use]
extern crate hamcrest;
use blobtier::{BackendKind, BackendRegistry, ContainerFactory, Tier, TierTable};
use hamcrest::prelude::*;

fn factory(dir: &tempfile::TempDir) -> ContainerFactory {
    let tiers = TierTable::new(
        vec![
            Tier::new(BackendKind::Memory, 4096),
            Tier::unbounded(BackendKind::File),
        ],
        u64::MAX,
    )
    .unwrap();
    ContainerFactory::new(tiers, BackendRegistry::with_defaults(dir.path().to_path_buf()))
}

#[test]
fn small_payload_stays_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let f = factory(&dir);
    let mut input = f.create();
    input.write_all(Some(b"one\ntwo\nthree\n")).unwrap();
    let mut output = f.create();

    to_upper::execute(&mut input, &mut output).unwrap();

    assert_that!(output.read_all().unwrap(), is(equal_to(b"ONE\nTWO\nTHREE\n".to_vec())));
    assert_that!(output.backend_kind(), is(equal_to(BackendKind::Memory)));
}

#[test]
fn large_payload_lands_in_file_tier() {
    let dir = tempfile::tempdir().unwrap();
    let f = factory(&dir);
    let text: Vec<u8> = b"the quick brown fox jumps over the lazy dog\n"
        .iter()
        .copied()
        .cycle()
        .take(50_000)
        .collect();
    let mut input = f.create();
    input.write_all(Some(&text)).unwrap();
    assert_eq!(input.backend_kind(), BackendKind::File);
    let mut output = f.create();

    let n = to_upper::execute(&mut input, &mut output).unwrap();

    assert_that!(n, is(equal_to(50_000)));
    assert_that!(output.backend_kind(), is(equal_to(BackendKind::File)));
    assert_eq!(output.read_all().unwrap(), text.to_ascii_uppercase());
}

#[test]
fn output_can_be_branched_with_clone() {
    let dir = tempfile::tempdir().unwrap();
    let f = factory(&dir);
    let mut input = f.create();
    input.write_all(Some(b"branch me")).unwrap();

    let mut snapshot = input.try_clone().unwrap();
    let mut output = f.create();
    to_upper::execute(&mut input, &mut output).unwrap();

    let mut twice = f.create();
    to_upper::execute(&mut output, &mut twice).unwrap();
    assert_eq!(twice.read_all().unwrap(), b"BRANCH ME");

    snapshot.write_all(Some(b"changed")).unwrap();
    assert_eq!(input.read_all().unwrap(), b"branch me");
}
