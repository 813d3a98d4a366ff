mod common;
use common::run_pipeline;

#[test]
fn minimal() {
    run_pipeline(include_str!("testfiles/minimal.minic"));
}

#[test]
fn arithmetic() {
    run_pipeline(include_str!("testfiles/arithmetic.minic"));
}

#[test]
fn widening() {
    run_pipeline(include_str!("testfiles/widening.minic"));
}

#[test]
fn branching() {
    run_pipeline(include_str!("testfiles/branching.minic"));
}

#[test]
fn loops() {
    run_pipeline(include_str!("testfiles/loops.minic"));
}

#[test]
fn functions() {
    run_pipeline(include_str!("testfiles/functions.minic"));
}

#[test]
fn strings() {
    run_pipeline(include_str!("testfiles/strings.minic"));
}

#[test]
fn fibonacci() {
    run_pipeline(include_str!("testfiles/fibonacci.minic"));
}
