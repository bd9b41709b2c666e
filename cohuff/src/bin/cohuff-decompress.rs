use std::env;
use std::process;

use cohuff::decompress_file;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        let name = args
            .first()
            .map(String::as_str)
            .unwrap_or("cohuff-decompress");
        eprintln!("usage: {name} <input_file> <output_file>");
        process::exit(2);
    }

    match decompress_file(&args[1], &args[2]) {
        Ok(report) => {
            if report.truncated {
                eprintln!(
                    "cohuff-decompress: warning: compressed payload ended early; wrote {} bytes",
                    report.output_bytes
                );
            }
            println!(
                "decompressed {} bytes into {} bytes",
                report.input_bytes, report.output_bytes
            );
            println!("execution time: {:.3}s", report.elapsed.as_secs_f64());
        }
        Err(err) => {
            eprintln!("cohuff-decompress: {err}");
            process::exit(1);
        }
    }
}
