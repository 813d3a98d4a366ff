/// Run a source string through the whole pipeline, returning the IR text
pub fn run_pipeline(src: &str) -> String {
    let program = minic::parse(src).unwrap();
    let program = minic::type_check(program).unwrap();
    let module = minic::lower(program).unwrap();
    module.to_string()
}
