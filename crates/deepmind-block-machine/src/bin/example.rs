use {
    deepmind_block_machine::{console::ConsoleReader, hydrator::JsonHydrator},
    std::io::BufReader,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let path = std::env::args().nth(1).expect("usage: example <node.dmlog>");
    let file = std::fs::File::open(&path).expect("open dmlog file");
    let mut reader =
        ConsoleReader::new(BufReader::new(file), Box::new(JsonHydrator)).expect("spawn scanner");

    loop {
        match reader.read_block().await {
            Ok(Some(block)) => {
                println!(
                    "block {} ({}): {} traces, {} actions ({} input)",
                    block.number,
                    block.id,
                    block.transaction_trace_count,
                    block.executed_total_action_count,
                    block.executed_input_action_count,
                );
            }
            Ok(None) => break,
            Err(error) => {
                eprintln!("stream error: {error}");
                std::process::exit(1);
            }
        }
    }
}
