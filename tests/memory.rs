use pretty_assertions::assert_eq;
use treelox::{Config, Lox};

fn session(threshold: usize) -> Lox<Vec<u8>> {
    Lox::with_config(Vec::new(), Config::default().gc_threshold(threshold))
}

fn output(lox: Lox<Vec<u8>>) -> String {
    String::from_utf8(lox.into_output()).unwrap()
}

#[test]
fn self_referencing_closure_is_reclaimed() {
    let mut lox = session(1024);
    lox.run("{ fun f() { return f; } var g = f; }").unwrap();
    let stats = lox.collect_garbage();
    assert_eq!(stats.live_environments, 1);
    assert!(stats.freed_environments >= 1);
}

#[test]
fn instance_cycles_are_reclaimed() {
    let mut lox = session(1024);
    lox.run(
        r#"
        class Node { init() { this.me = this; this.f = fun () { return this; }; } }
        { var a = Node(); var b = Node(); a.other = b; b.other = a; }
        "#,
    )
    .unwrap();
    let stats = lox.collect_garbage();
    assert_eq!(stats.live_instances, 0);
    assert_eq!(stats.live_environments, 1);
}

#[test]
fn captured_scope_lives_while_referenced() {
    let mut lox = session(1024);
    lox.run("var keep; { var x = \"inside\"; fun g() { return x; } keep = g; }")
        .unwrap();
    assert_eq!(lox.collect_garbage().live_environments, 2);
    lox.run("print keep();").unwrap();
    lox.run("keep = nil;").unwrap();
    assert_eq!(lox.collect_garbage().live_environments, 1);
    assert_eq!(output(lox), "inside\n");
}

#[test]
fn collection_during_execution_keeps_reachable_objects() {
    let mut lox = session(4);
    lox.run(
        r#"
        class Node { init(v, next) { this.v = v; this.next = next; } }
        var head = nil;
        for (var i = 1; i <= 100; i = i + 1) {
            head = Node(i, head);
            var junk = fun () { return junk; };
        }
        var sum = 0;
        var n = head;
        while (n != nil) { sum = sum + n.v; n = n.next; }
        print sum;
        "#,
    )
    .unwrap();
    let stats = lox.collect_garbage();
    assert_eq!(stats.live_instances, 100);
    assert_eq!(output(lox), "5050\n");
}

#[test]
fn in_flight_values_survive_collection() {
    let mut lox = session(1);
    lox.run(
        r#"
        class Box { init(v) { var tmp = v; this.v = tmp; } }
        fun pair(a, b) { return a.v + b.v; }
        print pair(Box(1), Box(2));
        print Box(3).v + Box(4).v;
        var o = Box(0);
        o.v = Box(5);
        print o.v.v;
        "#,
    )
    .unwrap();
    assert_eq!(output(lox), "3\n7\n5\n");
}

#[test]
fn closures_survive_frequent_collection() {
    let mut lox = session(1);
    lox.run(
        r#"
        fun makeCounter() {
            var i = 0;
            fun count() { i = i + 1; return i; }
            return count;
        }
        var c = makeCounter();
        for (var k = 0; k < 50; k = k + 1) c();
        print c();
        class A { name() { return "A"; } }
        class B < A { name() { return super.name() + "B"; } }
        var m = B().name;
        { var filler = makeCounter(); filler(); }
        print m();
        "#,
    )
    .unwrap();
    assert_eq!(output(lox), "51\nAB\n");
}

#[test]
fn garbage_does_not_accumulate() {
    let mut lox = session(16);
    lox.run(
        r#"
        class Tmp {}
        for (var i = 0; i < 2000; i = i + 1) {
            var t = Tmp();
            t.self = t;
            var f = fun () { return t; };
        }
        "#,
    )
    .unwrap();
    let stats = lox.collect_garbage();
    assert_eq!(stats.live_instances, 0);
    assert_eq!(stats.live_environments, 1);
}
