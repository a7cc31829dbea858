use fenris_em::classification::ElementShape;
use fenris_em::quadrature::{segment, simplex, tetrahedron, triangle};
use matrixcompare::assert_scalar_eq;

/// Integral of `x^a y^b z^c` over the unit simplex: `a! b! c! / (a + b + c + d)!`.
fn monomial_integral(exponents: [u32; 3], dim: u32) -> f64 {
    let factorial = |n: u32| (1..=n).map(f64::from).product::<f64>();
    let [a, b, c] = exponents;
    factorial(a) * factorial(b) * factorial(c) / factorial(a + b + c + dim)
}

#[test]
fn reference_measures() {
    for strength in 0..=8 {
        assert_scalar_eq!(segment(strength).unwrap().integrate(|_| 1.0), 1.0, comp = abs, tol = 1e-13);
        assert_scalar_eq!(triangle(strength).unwrap().integrate(|_| 1.0), 0.5, comp = abs, tol = 1e-13);
        assert_scalar_eq!(
            tetrahedron(strength).unwrap().integrate(|_| 1.0),
            1.0 / 6.0,
            comp = abs,
            tol = 1e-13
        );
    }
}

#[test]
fn segment_rule_is_exact_up_to_its_strength() {
    for strength in 0..=7 {
        let rule = segment(strength).unwrap();
        for a in 0..=strength as u32 {
            let integral = rule.integrate(|p| p.x.powi(a as i32));
            assert_scalar_eq!(integral, monomial_integral([a, 0, 0], 1), comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn triangle_rule_is_exact_up_to_its_strength() {
    let strength = 4;
    let rule = triangle(strength).unwrap();
    for a in 0..=strength as u32 {
        for b in 0..=(strength as u32 - a) {
            let integral = rule.integrate(|p| p.x.powi(a as i32) * p.y.powi(b as i32));
            let expected = monomial_integral([a, b, 0], 2);
            assert_scalar_eq!(integral, expected, comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn tetrahedron_rule_is_exact_up_to_its_strength() {
    let strength = 4;
    let rule = tetrahedron(strength).unwrap();
    for a in 0..=strength as u32 {
        for b in 0..=(strength as u32 - a) {
            for c in 0..=(strength as u32 - a - b) {
                let integral = rule.integrate(|p| p.x.powi(a as i32) * p.y.powi(b as i32) * p.z.powi(c as i32));
                let expected = monomial_integral([a, b, c], 3);
                assert_scalar_eq!(integral, expected, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn points_lie_inside_the_reference_simplex() {
    for shape in [ElementShape::Segment, ElementShape::Triangle, ElementShape::Tetrahedron] {
        let rule = simplex(shape, 4).unwrap();
        assert!(!rule.is_empty());
        let dim = shape.reference_dim();
        for (w, p) in rule.weights().iter().zip(rule.points()) {
            assert!(*w > 0.0);
            assert!(p.coords.iter().all(|&x| x >= -1e-14));
            assert!(p.coords.sum() <= 1.0 + 1e-14);
            // Unused coordinates stay zero
            assert!(p.coords.iter().skip(dim).all(|&x| x == 0.0));
        }
    }
}

#[test]
fn unsupported_strengths_are_rejected() {
    assert!(triangle(21).is_err());
    assert!(tetrahedron(100).is_err());
    assert!(simplex(ElementShape::Triangle, 100).is_err());
}
