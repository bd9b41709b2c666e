use std::env;
use std::process;

use cohuff::decompress_file_serial;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        let name = args
            .first()
            .map(String::as_str)
            .unwrap_or("cohuff-cpu-decompress");
        eprintln!("usage: {name} <input_file> <output_file>");
        process::exit(2);
    }

    match decompress_file_serial(&args[1], &args[2]) {
        Ok(report) => {
            if report.truncated {
                eprintln!(
                    "cohuff-cpu-decompress: warning: compressed payload ended early; wrote {} bytes",
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
            eprintln!("cohuff-cpu-decompress: {err}");
            process::exit(1);
        }
    }
}
