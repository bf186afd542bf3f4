use std::thread;

fn worker(id: u32) -> u32 {
    let mut total = 0u32;
    for i in 0..5 {
        total = total.wrapping_add(id * 7 + i);
    }
    total
}

fn main() {
    let handles: Vec<_> = (0..2).map(|id| thread::spawn(move || worker(id))).collect();
    let mut sum = 0u32;
    for h in handles {
        sum = sum.wrapping_add(h.join().unwrap());
    }
    println!("sum={sum}");
}
