use std::io::Write;

use goldenfile::Mint;

fn emission_test(source: &str, goldenfile: &str) {
    let mut mint = Mint::new("tests/goldenfiles/emission");
    let mut goldenfile = mint.new_goldenfile(goldenfile).unwrap();

    let program = minic::parse(source).unwrap();
    let program = minic::type_check(program).unwrap();
    let module = minic::lower(program).unwrap();

    write!(goldenfile, "{module}").unwrap();
}

#[test]
fn minimal() {
    emission_test(include_str!("testfiles/minimal.minic"), "minimal.ll");
}

#[test]
fn functions() {
    emission_test(include_str!("testfiles/functions.minic"), "functions.ll");
}
