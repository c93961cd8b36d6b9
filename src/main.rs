fn main() {
    bev_pipeline::cli::run();
}
