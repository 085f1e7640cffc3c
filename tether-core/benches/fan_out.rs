use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tether_core::observer::{observe, Array, Object, Value};
use tether_core::reactive::{Computed, WatchOptions, Watcher};
use tether_core::scheduler::run_until_idle;

fn state(fields: usize) -> Object {
    let obj: Object = (0..fields).map(|i| (format!("f{i}"), i)).collect();
    observe(&Value::from(obj.clone()));
    obj
}

fn render_watchers(obj: &Object, count: usize) -> Vec<Watcher> {
    (0..count)
        .map(|_| {
            let obj = obj.clone();
            Watcher::render(None, move || Ok(obj.get("f0")), WatchOptions::default())
                .expect("render watcher")
        })
        .collect()
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for watchers in [10usize, 100, 1_000] {
        group.bench_function(format!("write_and_flush(watchers={watchers})"), |b| {
            let obj = state(4);
            let _watchers = render_watchers(&obj, watchers);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                obj.set("f0", n);
                black_box(run_until_idle());
            });
        });
    }

    group.bench_function("observe(fields=256)", |b| {
        b.iter_batched(
            || (0..256).map(|i| (format!("f{i}"), i)).collect::<Object>(),
            |obj| black_box(observe(&Value::from(obj))),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("push_and_flush(array)", |b| {
        let array = Array::new();
        observe(&Value::from(array.clone()));
        let reader = array.clone();
        let _watcher = Watcher::render(
            None,
            move || Ok(Value::from(reader.clone())),
            WatchOptions::default().deep(),
        )
        .expect("render watcher");
        b.iter(|| {
            array.push([Value::from(1)]);
            black_box(run_until_idle());
        });
    });

    group.bench_function("computed_chain(depth=32)", |b| {
        let obj = state(1);
        let source = obj.clone();
        let mut head = Computed::new(move || Ok(source.get("f0")));
        for _ in 0..32 {
            let prev = head.clone();
            head = Computed::new(move || {
                let v = prev.get()?.as_f64().unwrap_or_default();
                Ok(Value::from(v + 1.0))
            });
        }
        let mut n = 0;
        b.iter(|| {
            n += 1;
            obj.set("f0", n);
            black_box(head.get().expect("computed"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
