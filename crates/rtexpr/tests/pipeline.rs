//! Full-lifecycle integration tests: discovery, typing, compilation
//! and repeated execution.

use rtexpr::{Evaluator, ExecutionMode, ScalarKind, TypeShape};

const F32: TypeShape = TypeShape::Scalar(ScalarKind::Float32);
const F64: TypeShape = TypeShape::Scalar(ScalarKind::Float64);

#[test]
fn arithmetic_end_to_end() {
    let text = "READ A\nREAD B\nSUB\nCONST float32 3.14\nMUL\nWRITE C\n";
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("A", F32).unwrap();
    engine.set_input_type("B", F32).unwrap();
    engine.compile().unwrap();

    engine.write_input("A", 2.0f32).unwrap();
    engine.write_input("B", 1.0f32).unwrap();
    engine.execute(ExecutionMode::Fast, None).unwrap();
    assert_eq!(engine.read_output::<f32>("C").unwrap(), 3.14);
}

#[test]
fn repeated_execution_reuses_memory() {
    let text = "READ A\nREAD B\nADD\nWRITE C\n";
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("A", F64).unwrap();
    engine.set_input_type("B", F64).unwrap();
    engine.compile().unwrap();

    for (a, b) in [(1.0, 2.0), (-4.5, 4.5), (1e12, 1.0)] {
        engine.write_input("A", a).unwrap();
        engine.write_input("B", b).unwrap();
        engine.execute(ExecutionMode::Safe, None).unwrap();
        assert_eq!(engine.read_output::<f64>("C").unwrap(), a + b);
    }
}

#[test]
fn const_and_cast_type_the_output() {
    let text = "CONST int8 25\nCAST uint8\nWRITE OUT1\n";
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.compile().unwrap();

    assert_eq!(
        engine.variables().output("OUT1").unwrap().shape(),
        TypeShape::Scalar(ScalarKind::Uint8)
    );
    engine.execute(ExecutionMode::Fast, None).unwrap();
    assert_eq!(engine.read_output::<u8>("OUT1").unwrap(), 25);
}

#[test]
fn external_scalar_bindings() {
    let text = "READ A\nREAD B\nADD\nWRITE C\n";
    let mut a: f64 = 1.5;
    let mut c: f64 = 0.0;
    let a_ptr = &mut a as *mut f64;
    let c_ptr = &mut c as *mut f64;

    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("A", F64).unwrap();
    engine.set_input_type("B", F64).unwrap();
    engine.set_input_memory("A", a_ptr.cast()).unwrap();
    // a bound output carries the caller's width; it must be declared
    engine.set_output_type("C", F64).unwrap();
    engine.set_output_memory("C", c_ptr.cast()).unwrap();
    engine.compile().unwrap();

    engine.write_input("B", 2.5f64).unwrap();
    engine.execute(ExecutionMode::Safe, None).unwrap();
    assert_eq!(unsafe { *c_ptr }, 4.0);

    unsafe { *a_ptr = 10.0 };
    engine.execute(ExecutionMode::Fast, None).unwrap();
    assert_eq!(unsafe { *c_ptr }, 12.5);
}

#[test]
fn comparisons_and_logic() {
    let text = "READ A\nCONST float64 0\nGT\nREAD B\nCONST float64 0\nGT\nAND\nWRITE BOTH\n";
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("A", F64).unwrap();
    engine.set_input_type("B", F64).unwrap();
    engine.compile().unwrap();

    engine.write_input("A", 3.0f64).unwrap();
    engine.write_input("B", -1.0f64).unwrap();
    engine.execute(ExecutionMode::Safe, None).unwrap();
    assert_eq!(engine.read_output::<u8>("BOTH").unwrap(), 0);

    engine.write_input("B", 0.5f64).unwrap();
    engine.execute(ExecutionMode::Safe, None).unwrap();
    assert_eq!(engine.read_output::<u8>("BOTH").unwrap(), 1);
}

#[test]
fn write_then_read_uses_intermediate_result() {
    let text = "READ A\nREAD A\nMUL\nWRITE SQ\nREAD SQ\nREAD A\nADD\nWRITE OUT\n";
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("A", F64).unwrap();
    engine.compile().unwrap();

    engine.write_input("A", 3.0f64).unwrap();
    engine.execute(ExecutionMode::Safe, None).unwrap();
    assert_eq!(engine.read_output::<f64>("SQ").unwrap(), 9.0);
    assert_eq!(engine.read_output::<f64>("OUT").unwrap(), 12.0);
}

#[test]
fn transcendental_chain() {
    let text = "READ X\nSIN\nREAD X\nCOS\nREAD X\nSIN\nMUL\nADD\nWRITE Y\n";
    // y = sin(x) + cos(x)*sin(x), all stack-resident until the store
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("X", F64).unwrap();
    engine.compile().unwrap();

    let x = 0.7f64;
    engine.write_input("X", x).unwrap();
    engine.execute(ExecutionMode::Safe, None).unwrap();
    let expected = x.sin() + x.cos() * x.sin();
    assert!((engine.read_output::<f64>("Y").unwrap() - expected).abs() < 1e-12);
}

#[test]
fn random_balanced_chains_compile_and_run() {
    // xorshift with a fixed seed: n pushes followed by n-1 binary
    // operators always leave exactly one value for the store, so
    // compilation must balance and execution must return to base
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for _ in 0..64 {
        let values = 1 + (next() % 5) as usize;
        let mut text = String::new();
        for i in 0..values {
            if next() % 2 == 0 {
                text.push_str(&format!("READ V{}\n", i));
            } else {
                text.push_str(&format!("CONST float64 {}\n", (next() % 100) as f64 / 8.0));
            }
        }
        for _ in 1..values {
            text.push_str(match next() % 3 {
                0 => "ADD\n",
                1 => "SUB\n",
                _ => "MUL\n",
            });
        }
        text.push_str("WRITE OUT\n");

        let mut engine = Evaluator::new(text.as_str());
        engine.extract_variables().unwrap();
        for i in 0..values {
            let name = format!("V{}", i);
            if engine.variables().input(&name).is_some() {
                engine.set_input_type(name.as_str(), F64).unwrap();
            }
        }
        engine
            .compile()
            .unwrap_or_else(|e| panic!("{} in:\n{}", e, text));
        engine
            .execute(ExecutionMode::Safe, None)
            .unwrap_or_else(|e| panic!("{} in:\n{}", e, text));
    }
}

#[test]
fn matrix_pipeline_with_external_result() {
    let text = "READ A\nREAD B\nADD\nWRITE C\n";
    let shape = TypeShape::Matrix {
        kind: ScalarKind::Float64,
        rows: 2,
        cols: 2,
    };
    let mut c = [0.0f64; 4];
    let c_ptr = c.as_mut_ptr();

    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine.set_input_type("A", shape).unwrap();
    engine.set_input_type("B", shape).unwrap();
    engine.set_output_type("C", shape).unwrap();
    engine.set_output_memory("C", c_ptr.cast()).unwrap();
    engine.compile().unwrap();

    let a = engine.input_memory("A").unwrap().cast::<f64>();
    let b = engine.input_memory("B").unwrap().cast::<f64>();
    unsafe {
        for i in 0..4 {
            *a.add(i) = (i + 1) as f64;
            *b.add(i) = 10.0;
        }
    }
    engine.execute(ExecutionMode::Safe, None).unwrap();
    assert_eq!(unsafe { [*c_ptr, *c_ptr.add(1), *c_ptr.add(2), *c_ptr.add(3)] }, [
        11.0, 12.0, 13.0, 14.0
    ]);
}

#[test]
fn matrix_product_dimensions() {
    let text = "READ A\nREAD B\nMUL\nWRITE C\n";
    let mut engine = Evaluator::new(text);
    engine.extract_variables().unwrap();
    engine
        .set_input_type(
            "A",
            TypeShape::Matrix {
                kind: ScalarKind::Float64,
                rows: 1,
                cols: 3,
            },
        )
        .unwrap();
    engine
        .set_input_type(
            "B",
            TypeShape::Matrix {
                kind: ScalarKind::Float64,
                rows: 3,
                cols: 1,
            },
        )
        .unwrap();
    engine.compile().unwrap();

    // the product is 1x1: a dot product
    assert_eq!(
        engine.variables().output("C").unwrap().shape(),
        TypeShape::Matrix {
            kind: ScalarKind::Float64,
            rows: 1,
            cols: 1,
        }
    );
    let a = engine.input_memory("A").unwrap().cast::<f64>();
    let b = engine.input_memory("B").unwrap().cast::<f64>();
    unsafe {
        for i in 0..3 {
            *a.add(i) = (i + 1) as f64;
            *b.add(i) = 2.0;
        }
    }
    engine.execute(ExecutionMode::Safe, None).unwrap();
    let c = engine.output_memory("C").unwrap().cast::<f64>();
    assert_eq!(unsafe { *c }, 12.0);
}
