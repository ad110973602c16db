fn main() {
    lecture_notes_lib::run()
}
