fn main() {
    trendsync_lib::run()
}
