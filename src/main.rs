fn main() {
    theo_survey::cli::run();
}
