fn main() {
    optimz::exec()
}
