use lookup_sql::path::{Path, parse};

fn main() {
    println!("sizeof(Path) = {}", std::mem::size_of::<Path>());

    for line in std::io::stdin().lines() {
        let Ok(line) = line else {
            break;
        };
        let now = std::time::Instant::now();
        let res = parse(line.trim());
        print!("[in {}μs] ", now.elapsed().as_micros());
        match res {
            Err(e) => println!("Error parsing input: {e}"),
            Ok(path) => {
                let segments: Vec<String> = path.segments().iter().map(|s| s.to_string()).collect();
                println!("{}", segments.join(" -> "));
            }
        }
    }
}
