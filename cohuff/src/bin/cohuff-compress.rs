use std::env;
use std::process;

use cohuff::{compress_file, HuffmanOptions};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        let name = args.first().map(String::as_str).unwrap_or("cohuff-compress");
        eprintln!("usage: {name} <input_file> <output_file>");
        process::exit(2);
    }

    match compress_file(&args[1], &args[2], &HuffmanOptions::default()) {
        Ok(report) => {
            println!(
                "compressed {} bytes into {} bytes ({:?}, {} kernel runs, gpu: {})",
                report.input_bytes,
                report.output_bytes,
                report.scenario,
                report.stats.kernel_runs,
                report.stats.used_gpu,
            );
            println!("execution time: {:.3}s", report.elapsed.as_secs_f64());
        }
        Err(err) => {
            eprintln!("cohuff-compress: {err}");
            process::exit(1);
        }
    }
}
