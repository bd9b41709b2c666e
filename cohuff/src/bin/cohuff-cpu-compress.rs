use std::env;
use std::process;

use cohuff::compress_file_serial;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        let name = args
            .first()
            .map(String::as_str)
            .unwrap_or("cohuff-cpu-compress");
        eprintln!("usage: {name} <input_file> <output_file>");
        process::exit(2);
    }

    match compress_file_serial(&args[1], &args[2]) {
        Ok(report) => {
            println!(
                "compressed {} bytes into {} bytes",
                report.input_bytes, report.output_bytes
            );
            println!("execution time: {:.3}s", report.elapsed.as_secs_f64());
        }
        Err(err) => {
            eprintln!("cohuff-cpu-compress: {err}");
            process::exit(1);
        }
    }
}
