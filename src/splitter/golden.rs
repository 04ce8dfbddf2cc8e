// Golden-section line search
//
// Derivative-free minimisation of a unimodal function on a bracket. Used to
// pin down a density minimum once the derivative scan has bracketed it.

const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Minimise `f` on `[a, b]` until the bracket is narrower than `accuracy`
///
/// Always terminates: at most `max_iterations` bracket reductions.
pub(crate) fn golden_section_minimize<F>(
    f: F,
    mut a: f64,
    mut b: f64,
    accuracy: f64,
    max_iterations: usize,
) -> f64
where
    F: Fn(f64) -> f64,
{
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..max_iterations {
        if (b - a).abs() <= accuracy {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
    }

    (a + b) / 2.0
}
