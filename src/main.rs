fn main() {
    if let Err(e) = party_defence_lib::run() {
        eprintln!("party-defence-tracker: {:#}", e);
        std::process::exit(1);
    }
}
